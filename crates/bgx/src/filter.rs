// ai
//! 🔍 ExpressionFilter — compile once, judge every record.
//!
//! 🎬 *[a courtroom. the defendant: one JSON log line. the charge: being interesting.]*
//!
//! A [`Filter`] is a boolean expression compiled up front (on the client to fail
//! fast before anything is dispatched, and again on the worker, once per batch)
//! and then evaluated against each decoded record. The language is small on purpose:
//!
//! ```text
//! level == "error" && contains(msg, "timeout")
//! http.status >= 500 || tags[0] in ["prod", "canary"]
//! path =~ `^/api/v\d+/` ? latency_ms > 250 : false
//! ```
//!
//! - literals: numbers, `"strings"`, `'strings'`, `` `raw strings` ``, `true`, `false`, `nil`/`null`, `[arrays]`
//! - fields: `level`, `http.status`, `labels["app"]`, `tags[0]` (missing fields are `null`)
//! - operators: `?:` `||` `&&` `==` `!=` `<` `<=` `>` `>=` `=~` `!~` `in` `+` `-` `*` `/` `%` `!`
//! - functions: `contains(haystack, needle)`, a case-insensitive substring search
//!
//! 🦆 The duck evaluated to `true`. Nobody knows what the expression was.

mod eval;
mod lexer;
mod parser;

use serde_json::Value;

/// 💀 Everything that can go wrong between "here's an expression" and "here's a bool".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    /// 🧱 The expression never made it past the parser. Fatal on the client.
    #[error("invalid expression at position {position}: {message}")]
    Compile { position: usize, message: String },
    /// ⚖️ The expression parsed fine but this particular record broke it.
    #[error("evaluation failed: {0}")]
    Eval(String),
}

/// ✅ A compiled boolean expression. Cheap to share, safe to evaluate from many threads.
#[derive(Debug, Clone)]
pub struct Filter {
    source: String,
    expr: parser::Expr,
}

impl Filter {
    /// 🏗️ Compile an expression. Errors carry the byte offset of the offending token.
    pub fn compile(source: &str) -> Result<Self, FilterError> {
        let tokens = lexer::tokenize(source)?;
        let expr = parser::parse(tokens, source.len())?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// ⚖️ Does this record match? Anything other than a bool at the top is an error.
    pub fn matches(&self, record: &Value) -> Result<bool, FilterError> {
        let verdict = eval::evaluate(&self.expr, record)?;
        match verdict.as_ref() {
            Value::Bool(b) => Ok(*b),
            other => Err(FilterError::Eval(format!(
                "expression '{}' produced {}, not a bool",
                self.source,
                eval::kind(other)
            ))),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn judge(expr: &str, record: Value) -> Result<bool, FilterError> {
        Filter::compile(expr)
            .expect("💀 expression should compile")
            .matches(&record)
    }

    #[test]
    fn the_one_where_contains_does_not_care_about_your_caps_lock() {
        let the_record = json!({});
        assert!(judge(r#"contains("FooBar", "bar")"#, the_record.clone()).unwrap());
        assert!(!judge(r#"contains("FooBar", "xyz")"#, the_record).unwrap());
    }

    #[test]
    fn the_one_where_contains_reads_fields_too() {
        let the_record = json!({"msg": "Upstream TIMEOUT after 30s"});
        assert!(judge("contains(msg, 'timeout')", the_record).unwrap());
    }

    #[test]
    fn the_one_where_contains_refuses_numbers() {
        let the_error = judge("contains(code, '5')", json!({"code": 503})).unwrap_err();
        assert!(matches!(the_error, FilterError::Eval(_)));
    }

    #[test]
    fn the_one_where_the_level_is_error() {
        assert!(judge(r#"level == "error""#, json!({"level": "error"})).unwrap());
        assert!(!judge(r#"level == "error""#, json!({"level": "info"})).unwrap());
    }

    #[test]
    fn the_one_where_missing_fields_are_just_null() {
        assert!(!judge(r#"level == "error""#, json!({"msg": "hi"})).unwrap());
        assert!(judge("level == nil", json!({"msg": "hi"})).unwrap());
        assert!(!judge("status > 500", json!({})).unwrap());
    }

    #[test]
    fn the_one_where_nested_paths_and_indexes_resolve() {
        let the_record = json!({
            "http": {"status": 503, "headers": {"x-request-id": "abc"}},
            "tags": ["prod", "eu"]
        });
        assert!(judge("http.status >= 500 && http.status < 600", the_record.clone()).unwrap());
        assert!(judge(r#"http.headers["x-request-id"] == "abc""#, the_record.clone()).unwrap());
        assert!(judge("tags[1] == 'eu'", the_record.clone()).unwrap());
        assert!(judge("tags[7] == nil", the_record).unwrap());
    }

    #[test]
    fn the_one_where_numbers_are_numbers_no_matter_the_decimal_point() {
        assert!(judge("n == 2", json!({"n": 2.0})).unwrap());
        assert!(judge("n * 2 + 1 == 5 && n % 2 == 0", json!({"n": 2})).unwrap());
        assert!(judge("-n < 0", json!({"n": 2})).unwrap());
    }

    #[test]
    fn the_one_where_logic_short_circuits_past_the_landmine() {
        // -- 🧨 the right side would blow up on a string, but never gets evaluated
        assert!(!judge("false && name > 3", json!({"name": "x"})).unwrap());
        assert!(judge("true || name > 3", json!({"name": "x"})).unwrap());
        assert!(judge("!(1 > 2)", json!({})).unwrap());
    }

    #[test]
    fn the_one_where_in_checks_membership() {
        assert!(judge("env in ['prod', 'staging']", json!({"env": "prod"})).unwrap());
        assert!(!judge("env in ['prod', 'staging']", json!({"env": "dev"})).unwrap());
        assert!(judge("3 in codes", json!({"codes": [1, 2, 3.0]})).unwrap());
    }

    #[test]
    fn the_one_where_regexes_match_and_unmatch() {
        let the_record = json!({"path": "/api/v2/users"});
        assert!(judge(r"path =~ `^/api/v\d+/`", the_record.clone()).unwrap());
        assert!(!judge(r"path !~ `^/api/`", the_record).unwrap());
    }

    #[test]
    fn the_one_where_the_ternary_picks_a_side() {
        let the_expr = "kind == 'slow' ? latency > 100 : latency > 1000";
        assert!(judge(the_expr, json!({"kind": "slow", "latency": 150})).unwrap());
        assert!(!judge(the_expr, json!({"kind": "fast", "latency": 150})).unwrap());
    }

    #[test]
    fn the_one_where_string_concatenation_is_a_thing() {
        assert!(judge("first + ' ' + last == 'Ada Lovelace'", json!({"first": "Ada", "last": "Lovelace"})).unwrap());
    }

    #[test]
    fn the_one_where_type_mixups_are_eval_errors() {
        for (the_expr, the_record) in [
            ("name > 3", json!({"name": "x"})),
            ("!name", json!({"name": "x"})),
            ("name && true", json!({"name": "x"})),
            ("1 / 0 > 1", json!({})),
        ] {
            let the_error = judge(the_expr, the_record).unwrap_err();
            assert!(
                matches!(the_error, FilterError::Eval(_)),
                "💀 '{the_expr}' should be an eval error, got {the_error:?}"
            );
        }
    }

    #[test]
    fn the_one_where_every_side_of_the_logic_must_be_a_bool() {
        for the_expr in ["true && name", "false || n", "n ? true : false"] {
            let the_error = judge(the_expr, json!({"name": "x", "n": 1})).unwrap_err();
            assert!(matches!(the_error, FilterError::Eval(_)), "💀 '{the_expr}' got {the_error:?}");
        }
        assert!(judge("ok ? ok && !no : no || ok", json!({"ok": true, "no": false})).unwrap());
    }

    #[test]
    fn the_one_where_a_bottomless_expression_is_refused_at_compile_time() {
        let the_tower = format!("{}true{}", "(".repeat(200_000), ")".repeat(200_000));
        assert!(matches!(Filter::compile(&the_tower), Err(FilterError::Compile { .. })));
    }

    #[test]
    fn the_one_where_a_non_bool_verdict_is_rejected() {
        let the_error = judge("status", json!({"status": 200})).unwrap_err();
        assert!(matches!(the_error, FilterError::Eval(_)));
    }

    #[test]
    fn the_one_where_compile_errors_fail_fast() {
        for the_bad_expr in ["level = 'error'", "(a == 1", "contains(a)", "a ==", "", "shout(a)"] {
            assert!(
                matches!(Filter::compile(the_bad_expr), Err(FilterError::Compile { .. })),
                "💀 '{the_bad_expr}' should not compile"
            );
        }
    }

    #[test]
    fn the_one_where_the_same_question_gets_the_same_answer() {
        let the_filter = Filter::compile("contains(msg, 'oops') && n > 1").unwrap();
        let the_record = json!({"msg": "OOPS I did it again", "n": 2});
        let the_first_verdict = the_filter.matches(&the_record).unwrap();
        for _ in 0..100 {
            assert_eq!(the_filter.matches(&the_record).unwrap(), the_first_verdict);
        }
        assert_eq!(the_filter.source(), "contains(msg, 'oops') && n > 1");
    }
}
