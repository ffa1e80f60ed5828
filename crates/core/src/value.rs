//! Value type definitions for Tessera.
//!
//! This module defines the `Value` enum which represents anything a query can bind,
//! navigate, compare or return.

use crate::entry::EntryRef;
use crate::region::RegionRef;
use crate::types::{ObjectType, StructType};
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;

/// A user object: a class name and an ordered set of named fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectValue {
    class: Arc<str>,
    fields: Vec<(Arc<str>, Value)>,
}

impl ObjectValue {
    /// Creates an object of the given class with no fields.
    pub fn new(class: impl AsRef<str>) -> Self {
        Self {
            class: Arc::from(class.as_ref()),
            fields: Vec::new(),
        }
    }

    /// Adds (or replaces) a field, builder style.
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a field value.
    pub fn set(&mut self, name: impl AsRef<str>, value: impl Into<Value>) {
        let name = name.as_ref();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n.as_ref() == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((Arc::from(name), value)),
        }
    }

    /// Returns the class name.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Returns a field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }

    /// Returns all fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_ref(), v))
    }
}

/// A struct row: values positioned by a shared `StructType`.
#[derive(Clone, Debug)]
pub struct StructValue {
    ty: Arc<StructType>,
    values: Arc<[Value]>,
}

impl StructValue {
    /// Creates a struct value. The value count must match the field count.
    pub fn new(ty: Arc<StructType>, values: Vec<Value>) -> Self {
        debug_assert_eq!(ty.len(), values.len());
        Self {
            ty,
            values: values.into(),
        }
    }

    /// Returns the struct type.
    pub fn struct_type(&self) -> &Arc<StructType> {
        &self.ty
    }

    /// Returns the field values in declaration order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.ty.field_index(name).and_then(|i| self.values.get(i))
    }
}

impl PartialEq for StructValue {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values && self.ty.field_names() == other.ty.field_names()
    }
}

impl Eq for StructValue {}

impl Hash for StructValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.values.hash(state);
    }
}

/// A value that a query can bind, navigate, compare or return.
#[derive(Clone, Debug)]
pub enum Value {
    /// The distinguished "no value" token (absent field, navigation through null).
    Undefined,
    /// Null reference.
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    /// User object.
    Object(Arc<ObjectValue>),
    /// Multi-column result row.
    Struct(StructValue),
    /// Collection of values.
    Collection(Arc<Vec<Value>>),
    /// Region entry.
    Entry(EntryRef),
    /// Region handle.
    Region(RegionRef),
}

impl Value {
    /// Wraps an object.
    pub fn object(object: ObjectValue) -> Self {
        Value::Object(Arc::new(object))
    }

    /// Builds a collection value.
    pub fn collection(values: impl IntoIterator<Item = Value>) -> Self {
        Value::Collection(Arc::new(values.into_iter().collect()))
    }

    /// Builds a struct value.
    pub fn structure(ty: Arc<StructType>, values: Vec<Value>) -> Self {
        Value::Struct(StructValue::new(ty, values))
    }

    /// Returns the runtime type of this value.
    pub fn data_type(&self) -> ObjectType {
        match self {
            Value::Undefined => ObjectType::Undefined,
            Value::Null => ObjectType::Null,
            Value::Boolean(_) => ObjectType::Boolean,
            Value::Int(_) => ObjectType::Int,
            Value::Long(_) => ObjectType::Long,
            Value::Double(_) => ObjectType::Double,
            Value::String(_) => ObjectType::String,
            Value::Object(o) => ObjectType::Object(o.class().to_string()),
            Value::Struct(_) => ObjectType::Struct,
            Value::Collection(_) => ObjectType::Collection,
            Value::Entry(_) => ObjectType::Entry,
            Value::Region(_) => ObjectType::Region,
        }
    }

    /// Returns true if this value is UNDEFINED.
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for the numeric variants.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Long(_) | Value::Double(_))
    }

    /// Returns the boolean value if this is a Boolean, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integral value of an Int or Long.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v as i64),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns any numeric value widened to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Long(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the object if this is an Object.
    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the struct if this is a Struct.
    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements if this is a Collection.
    pub fn as_collection(&self) -> Option<&[Value]> {
        match self {
            Value::Collection(c) => Some(c.as_slice()),
            _ => None,
        }
    }

    /// Returns the entry if this is an Entry.
    pub fn as_entry(&self) -> Option<&EntryRef> {
        match self {
            Value::Entry(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the region handle if this is a Region.
    pub fn as_region(&self) -> Option<&RegionRef> {
        match self {
            Value::Region(r) => Some(r),
            _ => None,
        }
    }

    /// Returns a named field of an object or struct.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(o) => o.field(name),
            Value::Struct(s) => s.get(name),
            _ => None,
        }
    }

    /// Creates a size or count value: an `Int` while it fits, otherwise a `Long`.
    pub fn count(n: usize) -> Value {
        match i32::try_from(n) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Long(i64::try_from(n).unwrap_or(i64::MAX)),
        }
    }

    /// Returns true if an ordering comparison between the two values is meaningful:
    /// both numeric, or both of the same non-numeric kind.
    pub fn is_comparable_with(&self, other: &Value) -> bool {
        if self.is_numeric() && other.is_numeric() {
            return true;
        }
        matches!(
            (self, other),
            (Value::Boolean(_), Value::Boolean(_))
                | (Value::String(_), Value::String(_))
                | (Value::Object(_), Value::Object(_))
                | (Value::Struct(_), Value::Struct(_))
                | (Value::Collection(_), Value::Collection(_))
                | (Value::Entry(_), Value::Entry(_))
        )
    }

    /// Returns true for values that support ordering comparisons: booleans,
    /// numbers and strings.
    pub fn is_orderable(&self) -> bool {
        matches!(
            self,
            Value::Boolean(_) | Value::Int(_) | Value::Long(_) | Value::Double(_) | Value::String(_)
        )
    }

    /// Compares two values, widening numbers across `Int`, `Long` and `Double`,
    /// so `1`, `1L` and `1.0` compare `Equal`.
    ///
    /// This is the comparison queries use. `Ord` refines it by breaking numeric
    /// ties on the representation, which keeps `Ord` consistent with `Eq` and
    /// `Hash` (where `Int(1) != Long(1)`).
    pub fn compare_widening(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Long(b)) => (*a as i64).cmp(b),
            (Value::Long(a), Value::Int(b)) => a.cmp(&(*b as i64)),
            (Value::Int(_) | Value::Long(_), Value::Double(b)) => {
                compare_f64(self.as_f64().unwrap_or_default(), *b)
            }
            (Value::Double(a), Value::Int(_) | Value::Long(_)) => {
                compare_f64(*a, other.as_f64().unwrap_or_default())
            }
            _ => self.cmp(other),
        }
    }

    /// Returns every numeric representation equal to this value under
    /// `compare_widening`, in `Ord` order. A non-numeric value is its only form.
    pub fn numeric_forms(&self) -> Vec<Value> {
        let exact = match self {
            Value::Int(i) => Some(*i as i64),
            Value::Long(l) => Some(*l),
            Value::Double(d)
                if d.fract() == 0.0 && *d >= i64::MIN as f64 && *d < i64::MAX as f64 =>
            {
                Some(*d as i64)
            }
            Value::Double(d) => return vec![Value::Double(*d)],
            other => return vec![other.clone()],
        };
        let mut forms = Vec::with_capacity(3);
        if let Some(i) = exact.and_then(|l| i32::try_from(l).ok()) {
            forms.push(Value::Int(i));
        }
        if let Some(l) = exact {
            forms.push(Value::Long(l));
        }
        forms.push(Value::Double(self.as_f64().unwrap_or_default()));
        forms
    }

    /// Ranks numeric representations for `Ord` tie-breaking.
    fn numeric_rank(&self) -> u8 {
        match self {
            Value::Long(_) => 1,
            Value::Double(_) => 2,
            _ => 0,
        }
    }

    /// Returns the rank used to order values of different types. All numeric
    /// types share one rank.
    pub fn type_rank(&self) -> u8 {
        match self {
            Value::Undefined => 0,
            Value::Null => 1,
            Value::Boolean(_) => 2,
            Value::Int(_) | Value::Long(_) | Value::Double(_) => 3,
            Value::String(_) => 4,
            Value::Object(_) => 5,
            Value::Struct(_) => 6,
            Value::Collection(_) => 7,
            Value::Entry(_) => 8,
            Value::Region(_) => 9,
        }
    }
}

fn region_ptr(r: &RegionRef) -> *const () {
    Arc::as_ptr(r) as *const ()
}

fn compare_f64(a: f64, b: f64) -> Ordering {
    // NaN sorts after every other number
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b
                }
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Collection(a), Value::Collection(b)) => a == b,
            (Value::Entry(a), Value::Entry(b)) => Arc::ptr_eq(a, b),
            (Value::Region(a), Value::Region(b)) => region_ptr(a) == region_ptr(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Value::Undefined | Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Long(i) => i.hash(state),
            Value::Double(f) => {
                let normalized = if *f == 0.0 { 0.0f64 } else { *f };
                normalized.to_bits().hash(state)
            }
            Value::String(s) => s.hash(state),
            Value::Object(o) => o.hash(state),
            Value::Struct(s) => s.hash(state),
            Value::Collection(c) => c.hash(state),
            Value::Entry(e) => (Arc::as_ptr(e) as usize).hash(state),
            Value::Region(r) => (region_ptr(r) as usize).hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => Ordering::Equal,
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Long(a), Value::Long(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => compare_f64(*a, *b),
            // Numbers of different representations order by value, then by type
            (
                Value::Int(_) | Value::Long(_) | Value::Double(_),
                Value::Int(_) | Value::Long(_) | Value::Double(_),
            ) => self
                .compare_widening(other)
                .then_with(|| self.numeric_rank().cmp(&other.numeric_rank())),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a
                .class()
                .cmp(b.class())
                .then_with(|| a.fields().cmp(b.fields())),
            (Value::Struct(a), Value::Struct(b)) => a.values().cmp(b.values()),
            (Value::Collection(a), Value::Collection(b)) => a.cmp(b),
            (Value::Entry(a), Value::Entry(b)) => a
                .key()
                .cmp(b.key())
                .then_with(|| (Arc::as_ptr(a) as usize).cmp(&(Arc::as_ptr(b) as usize))),
            (Value::Region(a), Value::Region(b)) => a
                .name()
                .cmp(b.name())
                .then_with(|| (region_ptr(a) as usize).cmp(&(region_ptr(b) as usize))),
            // Different types: order by type discriminant
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "UNDEFINED"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Long(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{}", s),
            Value::Object(o) => {
                write!(f, "{}{{", o.class())?;
                for (i, (name, value)) in o.fields().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", name, value)?;
                }
                write!(f, "}}")
            }
            Value::Struct(s) => {
                write!(f, "struct(")?;
                for (i, (name, value)) in s
                    .struct_type()
                    .field_names()
                    .iter()
                    .zip(s.values())
                    .enumerate()
                {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}:{}", name, value)?;
                }
                write!(f, ")")
            }
            Value::Collection(c) => {
                write!(f, "[")?;
                for (i, value) in c.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
            Value::Entry(e) => write!(f, "{}={}", e.key(), e.value()),
            Value::Region(r) => write!(f, "/{}", r.name()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<ObjectValue> for Value {
    fn from(v: ObjectValue) -> Self {
        Value::object(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Collection(Arc::new(v))
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_value_type_check() {
        assert_eq!(Value::Long(42).data_type(), ObjectType::Long);
        assert_eq!(Value::Undefined.data_type(), ObjectType::Undefined);
        let obj = Value::object(ObjectValue::new("Portfolio"));
        assert_eq!(obj.data_type(), ObjectType::Object("Portfolio".into()));
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::Int(42).as_i64(), Some(42));
        assert_eq!(Value::Long(100).as_i64(), Some(100));
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert!(Value::Undefined.is_undefined());
        assert!(Value::Null.is_null());
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Int(42), Value::Int(42));
        assert_ne!(Value::Int(42), Value::Long(42));
        assert_eq!(Value::Undefined, Value::Undefined);
        assert_ne!(Value::Undefined, Value::Null);
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
    }

    #[test]
    fn test_value_ordering() {
        assert!(Value::Int(1) < Value::Int(2));
        assert_eq!(Value::Int(5).compare_widening(&Value::Long(5)), Ordering::Equal);
        assert_eq!(Value::Double(5.0).compare_widening(&Value::Int(5)), Ordering::Equal);
        assert!(Value::Int(5) < Value::Double(5.5));
        assert!(Value::String("a".into()) < Value::String("b".into()));
        assert!(Value::Undefined < Value::Null);
        assert!(Value::Null < Value::Int(0));
    }

    #[test]
    fn test_ordering_agrees_with_equality() {
        let values = [Value::Int(1), Value::Long(1), Value::Double(1.0), Value::Long(2)];
        for a in &values {
            for b in &values {
                assert_eq!(a.cmp(b) == Ordering::Equal, a == b, "{a:?} vs {b:?}");
            }
        }
        assert!(Value::Int(1) < Value::Long(1));
        assert!(Value::Long(1) < Value::Double(1.0));
        assert!(Value::Double(1.0) < Value::Int(2));
    }

    #[test]
    fn test_count_widens_past_int() {
        assert_eq!(Value::count(5), Value::Int(5));
        assert_eq!(Value::count(i32::MAX as usize), Value::Int(i32::MAX));
        assert_eq!(Value::count(i32::MAX as usize + 1), Value::Long(1 << 31));
    }

    #[test]
    fn test_numeric_forms() {
        assert_eq!(
            Value::Int(3).numeric_forms(),
            vec![Value::Int(3), Value::Long(3), Value::Double(3.0)]
        );
        assert_eq!(
            Value::Long(1 << 40).numeric_forms(),
            vec![Value::Long(1 << 40), Value::Double((1i64 << 40) as f64)]
        );
        assert_eq!(Value::Double(2.5).numeric_forms(), vec![Value::Double(2.5)]);
        assert_eq!(Value::from("a").numeric_forms(), vec![Value::from("a")]);
    }

    #[test]
    fn test_object_fields() {
        let mut obj = ObjectValue::new("Position").with("secId", "IBM").with("qty", 10);
        obj.set("qty", 20);
        assert_eq!(obj.field("qty"), Some(&Value::Int(20)));
        assert_eq!(obj.fields().count(), 2);
    }

    #[test]
    fn test_struct_equality_and_hash() {
        let ty = Arc::new(StructType::new(vec!["a".into(), "b".into()]));
        let s1 = Value::structure(ty.clone(), vec![Value::Int(1), Value::from("x")]);
        let s2 = Value::structure(ty, vec![Value::Int(1), Value::from("x")]);
        assert_eq!(s1, s2);

        let mut set = HashSet::new();
        set.insert(s1);
        assert!(!set.insert(s2));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_negative_zero_hashes_like_zero() {
        let mut set = HashSet::new();
        set.insert(Value::Double(0.0));
        assert!(!set.insert(Value::Double(-0.0)));
    }

    #[test]
    fn test_value_from_impls() {
        let v: Value = 42i32.into();
        assert_eq!(v, Value::Int(42));

        let v: Value = "hello".into();
        assert_eq!(v.as_str(), Some("hello"));

        let v: Value = None::<i32>.into();
        assert!(v.is_null());

        let v: Value = vec![Value::Int(1), Value::Int(2)].into();
        assert_eq!(v.as_collection().map(|c| c.len()), Some(2));
    }
}
