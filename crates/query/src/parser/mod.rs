//! Query text parser.
//!
//! Recursive descent over the token stream produced by the lexer, building the
//! node arena bottom-up (children are pushed before their parent).
//!
//! Supported syntax:
//! - `SELECT [DISTINCT] (* | COUNT(*) | expr [AS name], ... | name: expr, ...)`
//! - `FROM expr [[AS] name], ... | name IN expr, ...`
//! - `WHERE`, `GROUP BY`, `ORDER BY expr [ASC|DESC]`, `LIMIT n | $n`
//! - region paths `/name`, attribute paths, method calls, `[i]` indexing
//! - `=`, `<>`, `!=`, `<`, `<=`, `>`, `>=`, `IN`, `LIKE`, `AND`, `OR`, `NOT`
//! - `IS_DEFINED(..)`, `IS_UNDEFINED(..)`, `ELEMENT(..)`, `SET(..)`, `LIST(..)`
//! - a leading `<trace>` hint

mod lexer;

use crate::ast::{
    getter_property, CollectionKind, CompiledQuery, CompiledValue, ComparisonOp, Function,
    JunctionOp, NodeId, Projection, ProjectionField, QueryBuilder, SelectNode, SelectPlan,
};
use crate::error::{QueryError, Result};
use lexer::{tokenize, Token, TokenKind};
use tessera_core::Value;

const RESERVED: &[&str] = &[
    "SELECT", "DISTINCT", "FROM", "WHERE", "GROUP", "ORDER", "BY", "LIMIT", "AND", "OR", "NOT",
    "IN", "LIKE", "AS", "ASC", "DESC",
];

const TRACE_HINT: &str = "<trace>";

/// Parses query text into an untransformed compiled query.
pub fn parse_query(text: &str) -> Result<CompiledQuery> {
    let trimmed = text.trim_start();
    let (body, traced) = match trimmed.get(..TRACE_HINT.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(TRACE_HINT) => {
            (&trimmed[TRACE_HINT.len()..], true)
        }
        _ => (trimmed, false),
    };
    let mut parser = Parser::new(body)?;
    let root = parser.query()?;
    parser.expect_eof()?;
    Ok(parser.builder.finish(body.trim(), root, traced))
}

/// Parses an index definition: an expression over the iterators of a FROM
/// clause. Returns a query of the form `SELECT <expression> FROM <from>`.
pub fn parse_index_definition(expression: &str, from: &str) -> Result<CompiledQuery> {
    parse_query(&format!("SELECT {} FROM {}", expression, from))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    builder: QueryBuilder,
}

impl Parser {
    fn new(text: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
            builder: QueryBuilder::new(),
        })
    }

    fn peek(&self) -> &Token {
        // tokenize always ends with Eof and the parser never advances past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(QueryError::syntax(message, self.peek().offset))
    }

    fn unexpected<T>(&self, expected: &str) -> Result<T> {
        self.error(format!(
            "expected {}, found {}",
            expected,
            self.peek().kind.describe()
        ))
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        keyword_eq(&self.peek().kind, keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            self.unexpected(keyword)
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            self.unexpected(what)
        }
    }

    fn expect_eof(&self) -> Result<()> {
        match self.peek().kind {
            TokenKind::Eof => Ok(()),
            ref other => self.error(format!("unexpected {}", other.describe())),
        }
    }

    /// A non-reserved identifier.
    fn name(&mut self) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Ident(s) if !is_reserved(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => self.unexpected("a name"),
        }
    }

    fn push(&mut self, value: CompiledValue) -> NodeId {
        self.builder.push(value)
    }

    /// A SELECT or a bare expression.
    fn query(&mut self) -> Result<NodeId> {
        if self.is_keyword("SELECT") {
            self.select()
        } else {
            self.expr()
        }
    }

    fn select(&mut self) -> Result<NodeId> {
        self.expect_keyword("SELECT")?;
        let distinct = self.eat_keyword("DISTINCT");
        let projection = self.projection()?;

        self.expect_keyword("FROM")?;
        let mut iterators = vec![self.iterator_def()?];
        while self.eat(&TokenKind::Comma) {
            iterators.push(self.iterator_def()?);
        }

        let where_clause = if self.eat_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if self.eat_keyword("GROUP") {
            self.expect_keyword("BY")?;
            group_by.push(self.expr()?);
            while self.eat(&TokenKind::Comma) {
                group_by.push(self.expr()?);
            }
        }

        let mut order_by = Vec::new();
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            order_by.push(self.sort_criterion()?);
            while self.eat(&TokenKind::Comma) {
                order_by.push(self.sort_criterion()?);
            }
        }

        let limit = if self.eat_keyword("LIMIT") {
            Some(self.limit()?)
        } else {
            None
        };

        Ok(self.push(CompiledValue::Select(Box::new(SelectNode {
            distinct,
            projection,
            iterators,
            where_clause,
            group_by,
            order_by,
            limit,
            plan: SelectPlan::default(),
        }))))
    }

    fn projection(&mut self) -> Result<Projection> {
        if self.eat(&TokenKind::Star) {
            return Ok(Projection::All);
        }
        if self.is_keyword("COUNT") && self.peek_at(1) == &TokenKind::LParen {
            self.advance();
            self.advance();
            self.expect(TokenKind::Star, "'*'")?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(Projection::Count);
        }
        let mut fields = vec![self.projection_field(0)?];
        while self.eat(&TokenKind::Comma) {
            let position = fields.len();
            fields.push(self.projection_field(position)?);
        }
        Ok(Projection::Columns(fields))
    }

    fn projection_field(&mut self, position: usize) -> Result<ProjectionField> {
        // `name: expr`
        if matches!(self.peek().kind, TokenKind::Ident(_)) && self.peek_at(1) == &TokenKind::Colon {
            let name = self.name()?;
            self.advance();
            let expr = self.expr()?;
            return Ok(ProjectionField { name, expr });
        }
        let expr = self.expr()?;
        let name = if self.eat_keyword("AS") {
            self.name()?
        } else {
            self.default_field_name(expr, position)
        };
        Ok(ProjectionField { name, expr })
    }

    fn default_field_name(&self, expr: NodeId, position: usize) -> String {
        match self.builder.node(expr) {
            CompiledValue::Identifier(name) => name.clone(),
            CompiledValue::Path { attribute, .. } => attribute.clone(),
            CompiledValue::MethodInvocation { name, args, .. } => {
                getter_property(name, args.len()).unwrap_or_else(|| name.clone())
            }
            _ => format!("field{}", position),
        }
    }

    fn iterator_def(&mut self) -> Result<NodeId> {
        // `name IN expr`
        if matches!(&self.peek().kind, TokenKind::Ident(s) if !is_reserved(s))
            && keyword_eq(self.peek_at(1), "IN")
        {
            let name = self.name()?;
            self.advance();
            let collection = self.expr()?;
            return Ok(self.push(CompiledValue::IteratorDef {
                name: Some(name),
                collection,
            }));
        }
        let collection = self.expr()?;
        let name = if self.eat_keyword("AS") {
            Some(self.name()?)
        } else if matches!(&self.peek().kind, TokenKind::Ident(s) if !is_reserved(s)) {
            Some(self.name()?)
        } else {
            None
        };
        Ok(self.push(CompiledValue::IteratorDef { name, collection }))
    }

    fn sort_criterion(&mut self) -> Result<NodeId> {
        let expr = self.expr()?;
        let descending = if self.eat_keyword("DESC") {
            true
        } else {
            self.eat_keyword("ASC");
            false
        };
        Ok(self.push(CompiledValue::SortCriterion { expr, descending }))
    }

    fn limit(&mut self) -> Result<NodeId> {
        match self.peek().kind {
            TokenKind::Int(n) | TokenKind::Long(n) => {
                self.advance();
                let n = i32::try_from(n).or_else(|_| self.error("LIMIT out of range"))?;
                Ok(self.push(CompiledValue::Literal(Value::Int(n))))
            }
            TokenKind::Bind(i) => {
                self.advance();
                Ok(self.push(CompiledValue::BindArgument(i)))
            }
            _ => self.unexpected("a non-negative LIMIT"),
        }
    }

    fn expr(&mut self) -> Result<NodeId> {
        self.junction(JunctionOp::Or)
    }

    fn junction(&mut self, op: JunctionOp) -> Result<NodeId> {
        let operand = |p: &mut Self| match op {
            JunctionOp::Or => p.junction(JunctionOp::And),
            JunctionOp::And => p.negation(),
        };
        let first = operand(self)?;
        let mut operands = vec![first];
        while self.eat_keyword(op.keyword()) {
            operands.push(operand(self)?);
        }
        if operands.len() == 1 {
            Ok(first)
        } else {
            Ok(self.push(CompiledValue::Junction { op, operands }))
        }
    }

    fn negation(&mut self) -> Result<NodeId> {
        if self.eat_keyword("NOT") {
            let inner = self.negation()?;
            return Ok(self.push(CompiledValue::Not(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<NodeId> {
        let left = self.postfix()?;
        let op = match self.peek().kind {
            TokenKind::Eq => Some(ComparisonOp::Eq),
            TokenKind::Ne => Some(ComparisonOp::Ne),
            TokenKind::Lt => Some(ComparisonOp::Lt),
            TokenKind::Le => Some(ComparisonOp::Le),
            TokenKind::Gt => Some(ComparisonOp::Gt),
            TokenKind::Ge => Some(ComparisonOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.postfix()?;
            return Ok(self.push(CompiledValue::Comparison { op, left, right }));
        }

        let negated = self.is_keyword("NOT")
            && (keyword_eq(self.peek_at(1), "IN") || keyword_eq(self.peek_at(1), "LIKE"));
        if negated {
            self.advance();
        }
        if self.eat_keyword("IN") {
            let collection = self.postfix()?;
            let node = self.push(CompiledValue::In {
                element: left,
                collection,
            });
            return Ok(if negated {
                self.push(CompiledValue::Not(node))
            } else {
                node
            });
        }
        if self.eat_keyword("LIKE") {
            let pattern = self.postfix()?;
            return Ok(self.push(CompiledValue::Like {
                operand: left,
                pattern,
                negated,
            }));
        }
        Ok(left)
    }

    fn postfix(&mut self) -> Result<NodeId> {
        let mut node = self.primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let name = self.name()?;
                if self.peek().kind == TokenKind::LParen {
                    let args = self.arguments()?;
                    node = self.push(CompiledValue::MethodInvocation {
                        receiver: Some(node),
                        name,
                        args,
                    });
                } else {
                    node = self.push(CompiledValue::Path {
                        receiver: node,
                        attribute: name,
                    });
                }
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expr()?;
                self.expect(TokenKind::RBracket, "']'")?;
                node = self.push(CompiledValue::Index {
                    receiver: node,
                    index,
                });
            } else {
                return Ok(node);
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<NodeId>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        args.push(self.query()?);
        while self.eat(&TokenKind::Comma) {
            args.push(self.query()?);
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<NodeId> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Int(n) => {
                self.advance();
                // the lexer only produces Int for values that fit
                let v = i32::try_from(n).map(Value::Int).unwrap_or(Value::Long(n));
                Ok(self.push(CompiledValue::Literal(v)))
            }
            TokenKind::Long(n) => {
                self.advance();
                Ok(self.push(CompiledValue::Literal(Value::Long(n))))
            }
            TokenKind::Double(d) => {
                self.advance();
                Ok(self.push(CompiledValue::Literal(Value::Double(d))))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(self.push(CompiledValue::Literal(Value::String(s))))
            }
            TokenKind::Bind(i) => {
                self.advance();
                Ok(self.push(CompiledValue::BindArgument(i)))
            }
            TokenKind::Minus => {
                self.advance();
                let value = match self.advance().kind {
                    TokenKind::Int(n) => i32::try_from(-n)
                        .map(Value::Int)
                        .unwrap_or(Value::Long(-n)),
                    TokenKind::Long(n) => Value::Long(-n),
                    TokenKind::Double(d) => Value::Double(-d),
                    _ => return Err(QueryError::syntax("expected a number after '-'", token.offset)),
                };
                Ok(self.push(CompiledValue::Literal(value)))
            }
            TokenKind::Slash => self.region_path(),
            TokenKind::LParen => {
                self.advance();
                let inner = self.query()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(ref word) => self.word(word.clone()),
            _ => self.unexpected("an expression"),
        }
    }

    fn region_path(&mut self) -> Result<NodeId> {
        let mut segments = Vec::new();
        while self.eat(&TokenKind::Slash) {
            segments.push(self.name()?);
        }
        Ok(self.push(CompiledValue::RegionPath(segments.join("/"))))
    }

    fn word(&mut self, word: String) -> Result<NodeId> {
        let upper = word.to_ascii_uppercase();
        let literal = match upper.as_str() {
            "TRUE" => Some(Value::Boolean(true)),
            "FALSE" => Some(Value::Boolean(false)),
            "NULL" => Some(Value::Null),
            "UNDEFINED" => Some(Value::Undefined),
            _ => None,
        };
        if let Some(v) = literal {
            self.advance();
            return Ok(self.push(CompiledValue::Literal(v)));
        }
        if is_reserved(&word) {
            return self.unexpected("an expression");
        }

        self.advance();
        if self.peek().kind != TokenKind::LParen {
            return Ok(self.push(CompiledValue::Identifier(word)));
        }

        let args = self.arguments()?;
        let function = match upper.as_str() {
            "IS_DEFINED" => Some(Function::IsDefined),
            "IS_UNDEFINED" => Some(Function::IsUndefined),
            "ELEMENT" => Some(Function::Element),
            _ => None,
        };
        if let Some(function) = function {
            if args.len() != 1 {
                return self.error(format!("{} takes one argument", function.name()));
            }
            return Ok(self.push(CompiledValue::Function { function, args }));
        }
        let kind = match upper.as_str() {
            "SET" => Some(CollectionKind::Set),
            "LIST" => Some(CollectionKind::List),
            _ => None,
        };
        if let Some(kind) = kind {
            return Ok(self.push(CompiledValue::Construct {
                kind,
                elements: args,
            }));
        }
        Ok(self.push(CompiledValue::MethodInvocation {
            receiver: None,
            name: word,
            args,
        }))
    }
}

fn keyword_eq(kind: &TokenKind, keyword: &str) -> bool {
    matches!(kind, TokenKind::Ident(s) if s.eq_ignore_ascii_case(keyword))
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(text: &str) -> String {
        let q = parse_query(text).unwrap();
        q.canonical(q.root())
    }

    #[test]
    fn test_parse_select() {
        let q = parse_query("SELECT DISTINCT p.status FROM /portfolios p WHERE p.ID > 4").unwrap();
        let select = q.root_select().unwrap();
        assert!(select.distinct);
        assert_eq!(select.iterators.len(), 1);
        assert_eq!(q.iterator_name(select.iterators[0]), Some("p"));
        match &select.projection {
            Projection::Columns(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].name, "status");
            }
            other => panic!("unexpected projection {:?}", other),
        }
        assert_eq!(q.canonical(select.where_clause.unwrap()), "p.ID > 4");
    }

    #[test]
    fn test_canonical_round_trip() {
        assert_eq!(
            canonical("select * from /R p where p.ID > 4 and p.ID < 9"),
            "(SELECT * FROM /R p WHERE (p.ID > 4 AND p.ID < 9))"
        );
        assert_eq!(
            canonical("SELECT ID, status FROM /R ORDER BY status, ID DESC LIMIT 3"),
            "(SELECT ID, status FROM /R ORDER BY status, ID DESC LIMIT 3)"
        );
    }

    #[test]
    fn test_getter_canonicalizes_to_property() {
        let a = parse_query("p.getStatus()").unwrap();
        let b = parse_query("p.status").unwrap();
        assert_eq!(a.canonical(a.root()), b.canonical(b.root()));
    }

    #[test]
    fn test_iterator_forms() {
        let q = parse_query("SELECT * FROM p IN /R, pos IN p.positions.values").unwrap();
        let select = q.root_select().unwrap();
        assert_eq!(q.iterator_name(select.iterators[0]), Some("p"));
        assert_eq!(q.iterator_name(select.iterators[1]), Some("pos"));

        let q = parse_query("SELECT * FROM /R AS p, /R.entrySet e, R").unwrap();
        let select = q.root_select().unwrap();
        assert_eq!(q.iterator_name(select.iterators[0]), Some("p"));
        assert_eq!(q.iterator_name(select.iterators[1]), Some("e"));
        assert_eq!(q.iterator_name(select.iterators[2]), None);
    }

    #[test]
    fn test_count_and_limit_bind() {
        let q = parse_query("SELECT COUNT(*) FROM /R WHERE ID > 0 LIMIT $1").unwrap();
        let select = q.root_select().unwrap();
        assert!(select.is_count());
        assert!(matches!(q.node(select.limit.unwrap()), CompiledValue::BindArgument(1)));
        assert_eq!(q.bind_count(), 1);
    }

    #[test]
    fn test_functions_and_constructors() {
        assert_eq!(
            canonical("IS_DEFINED(p.age) AND p.ID IN SET(1, 2, 3)"),
            "(IS_DEFINED(p.age) AND p.ID IN SET(1, 2, 3))"
        );
        assert_eq!(
            canonical("ELEMENT(SELECT * FROM /R p WHERE p.ID = 1)"),
            "ELEMENT((SELECT * FROM /R p WHERE p.ID = 1))"
        );
        assert_eq!(canonical("p.name NOT LIKE 'a%'"), "p.name NOT LIKE 'a%'");
        assert_eq!(canonical("NOT p.ID NOT IN $1"), "NOT (NOT (p.ID IN $1))");
        assert_eq!(canonical("p.ids[0] = -5"), "p.ids[0] = -5");
    }

    #[test]
    fn test_named_projection() {
        let q = parse_query("SELECT id: p.ID, p.status AS s FROM /R p").unwrap();
        match &q.root_select().unwrap().projection {
            Projection::Columns(fields) => {
                assert_eq!(fields[0].name, "id");
                assert_eq!(fields[1].name, "s");
            }
            other => panic!("unexpected projection {:?}", other),
        }
    }

    #[test]
    fn test_trace_hint() {
        let q = parse_query("<trace> SELECT * FROM /R").unwrap();
        assert!(q.is_traced());
        assert_eq!(q.text(), "SELECT * FROM /R");
        assert!(!parse_query("SELECT * FROM /R").unwrap().is_traced());
    }

    #[test]
    fn test_invalid_query() {
        let err = parse_query("INVALID QUERY").unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery { offset: 8, .. }));

        assert!(parse_query("SELECT * FROM").is_err());
        assert!(parse_query("SELECT * FROM /R WHERE").is_err());
        assert!(parse_query("SELECT * FROM /R LIMIT -1").is_err());
        assert!(parse_query("SELECT * FROM /R p ORDER p.ID").is_err());
        assert!(parse_query("(p.ID").is_err());
    }
}
