//! 🌳 The parser: recursive descent, one precedence level per function,
//! lowest binding first. Each level calls the next one down like a very
//! polite chain of command.

use regex::Regex;
use serde_json::Value;

use super::FilterError;
use super::lexer::{Spanned, Token};

/// 🧱 How deep an expression tree may get, and how deep the parser may recurse.
/// Evaluation walks the tree recursively, so this is what keeps a silly
/// expression from taking the stack down with it.
pub(crate) const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    /// 🔍 contains(haystack, needle): case-insensitive substring search
    Contains,
}

impl Function {
    fn resolve(name: &str) -> Option<(Self, usize)> {
        match name {
            "contains" => Some((Function::Contains, 2)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Value),
    Field(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Array(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Regex {
        target: Box<Expr>,
        pattern: Regex,
        negated: bool,
    },
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call(Function, Vec<Expr>),
}

pub(crate) fn parse(tokens: Vec<Spanned>, source_len: usize) -> Result<Expr, FilterError> {
    let mut parser = Parser {
        tokens,
        cursor: 0,
        source_len,
        nesting: 0,
    };
    if parser.tokens.is_empty() {
        return Err(parser.error_at(0, "empty expression"));
    }
    let expr = parser.parse_expr()?;
    match parser.tokens.get(parser.cursor) {
        None => Ok(expr),
        Some(trailing) => Err(parser.error_at(
            trailing.position,
            format!("unexpected trailing {:?}", trailing.token),
        )),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    source_len: usize,
    /// 🪆 how many `parse_expr`/`parse_unary` calls are on the stack right now
    nesting: usize,
}

impl Parser {
    fn parse_expr(&mut self) -> Result<Expr, FilterError> {
        self.nested(Self::parse_ternary)
    }

    fn parse_ternary(&mut self) -> Result<Expr, FilterError> {
        let condition = self.parse_or()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.parse_expr()?;
        self.expect(&Token::Colon, "':' in conditional expression")?;
        let otherwise = self.parse_expr()?;
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.parse_and()?;
        let mut depth = 0;
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_and()?;
            self.stack_on(&mut depth, &expr, Some(&rhs))?;
            expr = Expr::Or(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.parse_comparison()?;
        let mut depth = 0;
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_comparison()?;
            self.stack_on(&mut depth, &expr, Some(&rhs))?;
            expr = Expr::And(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.parse_additive()?;
        let mut depth = 0;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::In) => BinaryOp::In,
                Some(Token::RegexMatch) | Some(Token::RegexNotMatch) => {
                    let negated = matches!(self.peek(), Some(Token::RegexNotMatch));
                    self.cursor += 1;
                    let pattern = self.expect_regex()?;
                    self.stack_on(&mut depth, &expr, None)?;
                    expr = Expr::Regex {
                        target: Box::new(expr),
                        pattern,
                        negated,
                    };
                    continue;
                }
                _ => return Ok(expr),
            };
            self.cursor += 1;
            let rhs = self.parse_additive()?;
            self.stack_on(&mut depth, &expr, Some(&rhs))?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.parse_multiplicative()?;
        let mut depth = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(expr),
            };
            self.cursor += 1;
            let rhs = self.parse_multiplicative()?;
            self.stack_on(&mut depth, &expr, Some(&rhs))?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.parse_unary()?;
        let mut depth = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(expr),
            };
            self.cursor += 1;
            let rhs = self.parse_unary()?;
            self.stack_on(&mut depth, &expr, Some(&rhs))?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        if self.eat(&Token::Bang) {
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        if self.eat(&Token::Minus) {
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr::Unary(UnaryOp::Negate, Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.parse_primary()?;
        let mut depth = 0;
        loop {
            if self.eat(&Token::Dot) {
                let name = self.expect_ident("field name after '.'")?;
                self.stack_on(&mut depth, &expr, None)?;
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&Token::RBracket, "']' after index")?;
                self.stack_on(&mut depth, &expr, Some(&index))?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, FilterError> {
        let position = self.position();
        let Some(spanned) = self.tokens.get(self.cursor).cloned() else {
            return Err(self.error_at(position, "unexpected end of expression"));
        };
        self.cursor += 1;
        match spanned.token {
            Token::Number(n) => serde_json::Number::from_f64(n)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| self.error_at(position, "number is not finite")),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => self.parse_array_literal(),
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    self.parse_call(&name, position)
                } else {
                    Ok(Expr::Field(name))
                }
            }
            other => Err(self.error_at(position, format!("unexpected {other:?}"))),
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expr, FilterError> {
        let mut items = Vec::new();
        if self.eat(&Token::RBracket) {
            return Ok(Expr::Array(items));
        }
        loop {
            items.push(self.parse_expr()?);
            if self.eat(&Token::RBracket) {
                return Ok(Expr::Array(items));
            }
            self.expect(&Token::Comma, "',' or ']' in array literal")?;
        }
    }

    fn parse_call(&mut self, name: &str, position: usize) -> Result<Expr, FilterError> {
        let Some((function, arity)) = Function::resolve(name) else {
            return Err(self.error_at(position, format!("unknown function '{name}'")));
        };
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma, "',' or ')' in argument list")?;
            }
        }
        if args.len() != arity {
            return Err(self.error_at(
                position,
                format!("{name}() takes {arity} arguments, got {}", args.len()),
            ));
        }
        Ok(Expr::Call(function, args))
    }

    fn expect_regex(&mut self) -> Result<Regex, FilterError> {
        let position = self.position();
        match self.tokens.get(self.cursor).map(|s| &s.token) {
            Some(Token::Str(pattern)) => {
                let compiled = Regex::new(pattern)
                    .map_err(|e| self.error_at(position, format!("invalid regex: {e}")))?;
                self.cursor += 1;
                Ok(compiled)
            }
            _ => Err(self.error_at(position, "expected a string literal regex")),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, FilterError> {
        let position = self.position();
        match self.tokens.get(self.cursor).map(|s| &s.token) {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.cursor += 1;
                Ok(name)
            }
            _ => Err(self.error_at(position, format!("expected {what}"))),
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), FilterError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error_at(self.position(), format!("expected {what}")))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map(|s| s.position)
            .unwrap_or(self.source_len)
    }

    /// 🪆 Run one level of recursive descent, refusing to go past [`MAX_DEPTH`].
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, FilterError>,
    ) -> Result<T, FilterError> {
        if self.nesting >= MAX_DEPTH {
            return Err(self.too_deep());
        }
        self.nesting += 1;
        let parsed = parse(self);
        self.nesting -= 1;
        parsed
    }

    /// 📏 Account for a new node with `lhs` (and maybe `rhs`) under it. `depth` is the
    /// running depth of `lhs`, 0 until first measured.
    fn stack_on(
        &self,
        depth: &mut usize,
        lhs: &Expr,
        rhs: Option<&Expr>,
    ) -> Result<(), FilterError> {
        if *depth == 0 {
            *depth = tree_depth(lhs);
        }
        *depth = (*depth).max(rhs.map_or(0, tree_depth)) + 1;
        if *depth > MAX_DEPTH {
            return Err(self.too_deep());
        }
        Ok(())
    }

    fn too_deep(&self) -> FilterError {
        self.error_at(
            self.position(),
            format!("expression nests deeper than {MAX_DEPTH} levels"),
        )
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> FilterError {
        FilterError::Compile {
            position,
            message: message.into(),
        }
    }
}

/// 📏 Height of a tree, walked with an explicit stack so measuring cannot overflow either.
fn tree_depth(root: &Expr) -> usize {
    let mut deepest = 0;
    let mut pending = vec![(root, 1)];
    while let Some((expr, depth)) = pending.pop() {
        deepest = deepest.max(depth);
        let below = depth + 1;
        match expr {
            Expr::Literal(_) | Expr::Field(_) => {}
            Expr::Member(inner, _) | Expr::Unary(_, inner) | Expr::Regex { target: inner, .. } => {
                pending.push((&**inner, below))
            }
            Expr::Index(lhs, rhs)
            | Expr::Binary(_, lhs, rhs)
            | Expr::And(lhs, rhs)
            | Expr::Or(lhs, rhs) => {
                pending.push((&**lhs, below));
                pending.push((&**rhs, below));
            }
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                pending.push((&**condition, below));
                pending.push((&**then, below));
                pending.push((&**otherwise, below));
            }
            Expr::Array(items) | Expr::Call(_, items) => {
                pending.extend(items.iter().map(|item| (item, below)))
            }
        }
    }
    deepest
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn parse_str(input: &str) -> Result<Expr, FilterError> {
        parse(tokenize(input)?, input.len())
    }

    #[test]
    fn the_one_where_and_binds_tighter_than_or() {
        let the_tree = parse_str("a || b && c").expect("💀 should parse");
        match the_tree {
            Expr::Or(lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Field(ref name) if name == "a"));
                assert!(matches!(*rhs, Expr::And(_, _)));
            }
            other => panic!("💀 expected Or at the root, got {other:?}"),
        }
    }

    #[test]
    fn the_one_where_paths_chain_dots_and_brackets() {
        let the_tree = parse_str(r#"http.headers["x-id"][0]"#).expect("💀 should parse");
        match the_tree {
            Expr::Index(inner, _) => match *inner {
                Expr::Index(member, _) => {
                    assert!(matches!(*member, Expr::Member(_, ref name) if name == "headers"))
                }
                other => panic!("💀 expected nested index, got {other:?}"),
            },
            other => panic!("💀 expected Index at the root, got {other:?}"),
        }
    }

    #[test]
    fn the_one_where_unknown_functions_are_turned_away() {
        let the_error = parse_str("shout(msg)").expect_err("💀 unknown fn should fail");
        assert!(matches!(the_error, FilterError::Compile { position: 0, .. }));
    }

    #[test]
    fn the_one_where_contains_counts_its_arguments() {
        assert!(parse_str("contains(msg)").is_err());
        assert!(parse_str("contains(msg, 'a', 'b')").is_err());
        assert!(parse_str("contains(msg, 'a')").is_ok());
    }

    #[test]
    fn the_one_where_regex_must_be_a_literal_and_valid() {
        assert!(parse_str("msg =~ other_field").is_err());
        assert!(parse_str("msg =~ '('").is_err());
        assert!(parse_str("msg !~ '^GET '").is_ok());
    }

    #[test]
    fn the_one_where_a_paren_tower_is_a_compile_error_not_a_crash() {
        let the_tower = format!("{}true{}", "(".repeat(200_000), ")".repeat(200_000));
        let the_error = parse_str(&the_tower).expect_err("💀 should refuse to recurse forever");
        assert!(
            matches!(the_error, FilterError::Compile { ref message, .. } if message.contains("deeper than")),
            "{the_error:?}"
        );

        let the_modest_tower = format!("{}true{}", "(".repeat(20), ")".repeat(20));
        assert!(parse_str(&the_modest_tower).is_ok());
    }

    #[test]
    fn the_one_where_long_chains_and_bang_stacks_are_capped_too() {
        let the_chain = format!("n{} > 0", " + 1".repeat(100_000));
        assert!(matches!(parse_str(&the_chain), Err(FilterError::Compile { .. })));
        let the_path = format!("a{}", ".b".repeat(100_000));
        assert!(matches!(parse_str(&the_path), Err(FilterError::Compile { .. })));
        let the_bangs = format!("{}true", "!".repeat(100_000));
        assert!(matches!(parse_str(&the_bangs), Err(FilterError::Compile { .. })));

        let the_reasonable_chain = format!("n{} > 0", " + 1".repeat(50));
        assert!(parse_str(&the_reasonable_chain).is_ok());
    }

    #[test]
    fn the_one_where_dangling_tokens_are_not_ignored() {
        let the_error = parse_str("a == 1 )").expect_err("💀 trailing paren should fail");
        assert!(matches!(the_error, FilterError::Compile { position: 7, .. }));
        assert!(parse_str("").is_err());
        assert!(parse_str("a ==").is_err());
    }
}
