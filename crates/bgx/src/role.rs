//! 🎭 Role — one binary, two jobs, decided once at startup.
//!
//! Inside Lambda the runtime sets `AWS_LAMBDA_FUNCTION_NAME`; there we are the
//! batch worker. Anywhere else we are the client that lists, batches and dispatches.
//! The binary matches on this exactly once and never asks again.

/// 🏷️ The environment variable Lambda sets for every function.
pub const FUNCTION_NAME_VAR: &str = "AWS_LAMBDA_FUNCTION_NAME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// λ serve batches for the named function
    Handler { function_name: String },
    /// 🖥️ drive a search from the command line
    Client,
}

impl Role {
    pub fn detect() -> Self {
        Self::from_function_name(std::env::var(FUNCTION_NAME_VAR).ok())
    }

    pub fn from_function_name(function_name: Option<String>) -> Self {
        match function_name {
            Some(name) if !name.trim().is_empty() => Role::Handler {
                function_name: name,
            },
            _ => Role::Client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_lambda_gives_itself_away() {
        assert_eq!(
            Role::from_function_name(Some("bgx-worker".into())),
            Role::Handler {
                function_name: "bgx-worker".into()
            }
        );
    }

    #[test]
    fn the_one_where_a_laptop_is_just_a_client() {
        assert_eq!(Role::from_function_name(None), Role::Client);
        assert_eq!(Role::from_function_name(Some("  ".into())), Role::Client);
    }
}
