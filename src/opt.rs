//! A small command-line option parser.
//!
//! Params are declared up front on an [`OptConfig`] with a short (`-v`) and a
//! long (`--verbose`) name. Parsing walks the tokens once: a token naming a
//! param records a match, a value param takes the next plain token as its
//! value, and everything else ends up in the extras.

use std::fmt;

use thiserror::Error;
use tracing::{debug, trace};

pub type OptResult<T> = Result<T, OptError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptError {
    #[error("invalid short name {0:?}, expected a dash and one letter")]
    InvalidShortName(String),
    #[error("invalid long name {0:?}, expected two dashes and a name starting with a letter")]
    InvalidLongName(String),
    #[error("unknown param {0:?}")]
    UnknownParam(String),
    #[error("required param {long_name} ({short_name}) is missing")]
    MissingRequired {
        short_name: String,
        long_name: String,
    },
}

/// whether a param stands alone or takes the following token as its value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Flag,
    Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    short_name: String,
    long_name: String,
    kind: ParamKind,
    presence: Presence,
}

impl Param {
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn long_name(&self) -> &str {
        &self.long_name
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn presence(&self) -> Presence {
        self.presence
    }

    fn is_named(&self, name: &str) -> bool {
        self.short_name == name || self.long_name == name
    }
}

/// the set of params a program accepts, in declaration order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptConfig {
    params: Vec<Param>,
}

impl OptConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// declare a param. both names are validated before anything is added
    pub fn add_param(
        &mut self,
        short_name: &str,
        long_name: &str,
        kind: ParamKind,
        presence: Presence,
    ) -> OptResult<&mut Self> {
        if !is_short_name(short_name) {
            return Err(OptError::InvalidShortName(short_name.to_owned()));
        }
        if !is_long_name(long_name) {
            return Err(OptError::InvalidLongName(long_name.to_owned()));
        }

        self.params.push(Param {
            short_name: short_name.to_owned(),
            long_name: long_name.to_owned(),
            kind,
            presence,
        });
        Ok(self)
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    fn find(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|param| param.is_named(name))
    }

    /// parse the process arguments, skipping the program name
    pub fn parse_env_args(&self) -> OptResult<ParseResult> {
        self.parse(std::env::args().skip(1))
    }

    /// parse `tokens`, which must not include the program name
    pub fn parse<I, S>(&self, tokens: I) -> OptResult<ParseResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut result = ParseResult::default();
        let mut awaiting_value = false;

        for token in tokens {
            let token = token.into();

            if looks_like_param(&token) {
                let param = self
                    .find(&token)
                    .ok_or_else(|| OptError::UnknownParam(token.clone()))?;
                trace!(token = %token, long_name = %param.long_name, "matched param");

                result.matches.push(Match {
                    short_name: param.short_name.clone(),
                    long_name: param.long_name.clone(),
                    value: None,
                });
                awaiting_value = param.kind == ParamKind::Value;
                continue;
            }

            match result.matches.last_mut() {
                Some(last) if awaiting_value => {
                    trace!(long_name = %last.long_name, value = %token, "assigned value");
                    last.value = Some(token);
                    awaiting_value = false;
                }
                _ => {
                    trace!(token = %token, "extra token");
                    result.extras.push(token);
                }
            }
        }

        if let Some(missing) = self
            .params
            .iter()
            .filter(|param| param.presence == Presence::Required)
            .find(|param| !result.exists(&param.short_name))
        {
            return Err(OptError::MissingRequired {
                short_name: missing.short_name.clone(),
                long_name: missing.long_name.clone(),
            });
        }

        debug!(
            matches = result.matches.len(),
            extras = result.extras.len(),
            "parsed options"
        );
        Ok(result)
    }
}

impl fmt::Display for OptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SYPHA_OPT_CONFIG:")?;
        writeln!(f, "{{")?;
        for param in &self.params {
            let kind = match param.kind {
                ParamKind::Flag => "flag",
                ParamKind::Value => "non-flag",
            };
            let presence = match param.presence {
                Presence::Required => "required",
                Presence::Optional => "optional",
            };
            writeln!(
                f,
                "\t{{ {}, {}, {}, {} }}",
                param.short_name, param.long_name, kind, presence
            )?;
        }
        writeln!(f, "}}")
    }
}

/// a param found while parsing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    short_name: String,
    long_name: String,
    value: Option<String>,
}

impl Match {
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn long_name(&self) -> &str {
        &self.long_name
    }

    /// None for flags, and for value params that ran out of tokens
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseResult {
    matches: Vec<Match>,
    extras: Vec<String>,
}

impl ParseResult {
    /// true if a param was given under either of its names
    pub fn exists(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// the value of the first match for `name`
    pub fn value(&self, name: &str) -> Option<&str> {
        self.find(name).and_then(Match::value)
    }

    /// tokens that were neither params nor values, in input order
    pub fn extras(&self) -> &[String] {
        &self.extras
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    fn find(&self, name: &str) -> Option<&Match> {
        self.matches
            .iter()
            .find(|m| m.short_name == name || m.long_name == name)
    }
}

impl fmt::Display for ParseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SYPHA_OPT_PARSE_RESULT:")?;
        writeln!(f, "{{")?;
        for m in &self.matches {
            write!(f, "\t{{ {:?} | {:?} => ", m.short_name, m.long_name)?;
            match &m.value {
                Some(value) => writeln!(f, "{:?} }}", value)?,
                None => writeln!(f, "_set_ }}")?,
            }
        }
        for extra in &self.extras {
            writeln!(f, "\t{{ {} }}", extra)?;
        }
        writeln!(f, "}}")
    }
}

fn is_short_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 2 && bytes[0] == b'-' && bytes[1].is_ascii_alphabetic()
}

fn is_long_name(name: &str) -> bool {
    name.strip_prefix("--")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|first| first.is_ascii_alphabetic())
}

/// `-x` or `--xyz`. anything else is a value or an extra
fn looks_like_param(token: &str) -> bool {
    (token.len() == 2 && token.starts_with('-')) || (token.len() > 2 && token.starts_with("--"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OptConfig {
        let mut cfg = OptConfig::new();
        cfg.add_param("-v", "--verbose", ParamKind::Flag, Presence::Optional)
            .expect("failed to add param")
            .add_param("-o", "--output", ParamKind::Value, Presence::Required)
            .expect("failed to add param")
            .add_param("-l", "--level", ParamKind::Value, Presence::Optional)
            .expect("failed to add param");
        cfg
    }

    #[test]
    fn rejects_bad_short_names() {
        let mut cfg = OptConfig::new();
        for name in ["v", "-", "--", "-vv", "-1", "x-"] {
            assert_eq!(
                cfg.add_param(name, "--verbose", ParamKind::Flag, Presence::Optional),
                Err(OptError::InvalidShortName(name.to_owned()))
            );
        }
        assert!(cfg.params().is_empty());
    }

    #[test]
    fn rejects_bad_long_names() {
        let mut cfg = OptConfig::new();
        for name in ["verbose", "-verbose", "--", "--1x", "---x"] {
            assert_eq!(
                cfg.add_param("-v", name, ParamKind::Flag, Presence::Optional),
                Err(OptError::InvalidLongName(name.to_owned()))
            );
        }
        assert!(cfg.params().is_empty());
    }

    #[test]
    fn accepts_minimal_long_name() {
        let mut cfg = OptConfig::new();
        cfg.add_param("-x", "--x", ParamKind::Flag, Presence::Optional)
            .expect("failed to add param");
        assert_eq!(cfg.params()[0].long_name(), "--x");
    }

    #[test]
    fn parses_flags_values_and_extras() {
        let result = config()
            .parse(["in.txt", "-v", "--output", "out.txt", "more"])
            .expect("failed to parse");

        assert!(result.exists("-v"));
        assert!(result.exists("--verbose"));
        assert_eq!(result.value("-v"), None);
        assert_eq!(result.value("-o"), Some("out.txt"));
        assert_eq!(result.value("--output"), Some("out.txt"));
        assert!(!result.exists("--level"));
        assert_eq!(result.extras(), ["in.txt", "more"]);
        assert_eq!(result.matches().len(), 2);
    }

    #[test]
    fn unknown_param_fails() {
        assert_eq!(
            config().parse(["-o", "x", "--nope"]),
            Err(OptError::UnknownParam("--nope".to_owned()))
        );
        assert_eq!(
            config().parse(["-q", "-o", "x"]),
            Err(OptError::UnknownParam("-q".to_owned()))
        );
    }

    #[test]
    fn missing_required_param_fails() {
        assert_eq!(
            config().parse(["-v"]),
            Err(OptError::MissingRequired {
                short_name: "-o".to_owned(),
                long_name: "--output".to_owned(),
            })
        );
    }

    #[test]
    fn value_param_at_the_end_has_no_value() {
        let result = config().parse(["-o"]).expect("failed to parse");
        assert!(result.exists("--output"));
        assert_eq!(result.value("--output"), None);
    }

    #[test]
    fn a_param_cancels_a_pending_value() {
        let result = config()
            .parse(["-l", "-o", "out", "stray"])
            .expect("failed to parse");
        assert_eq!(result.value("-l"), None);
        assert_eq!(result.value("-o"), Some("out"));
        assert_eq!(result.extras(), ["stray"]);
    }

    #[test]
    fn first_match_wins() {
        let result = config()
            .parse(["-o", "first", "--output", "second"])
            .expect("failed to parse");
        assert_eq!(result.value("-o"), Some("first"));
        assert_eq!(result.matches()[1].value(), Some("second"));
    }

    #[test]
    fn dash_prefixed_tokens_that_are_not_params_are_extras() {
        let result = config()
            .parse(["-o", "out", "-", "-abc"])
            .expect("failed to parse");
        assert_eq!(result.extras(), ["-", "-abc"]);
    }

    #[test]
    fn config_renders_every_param() {
        assert_eq!(
            config().to_string(),
            "SYPHA_OPT_CONFIG:\n{\n\
             \t{ -v, --verbose, flag, optional }\n\
             \t{ -o, --output, non-flag, required }\n\
             \t{ -l, --level, non-flag, optional }\n\
             }\n"
        );
    }

    #[test]
    fn result_renders_matches_then_extras() {
        let result = config()
            .parse(["-v", "-o", "out", "extra"])
            .expect("failed to parse");
        assert_eq!(
            result.to_string(),
            "SYPHA_OPT_PARSE_RESULT:\n{\n\
             \t{ \"-v\" | \"--verbose\" => _set_ }\n\
             \t{ \"-o\" | \"--output\" => \"out\" }\n\
             \t{ extra }\n\
             }\n"
        );
    }

    #[test]
    fn env_args_skip_the_program_name() {
        let mut cfg = OptConfig::new();
        cfg.add_param("-v", "--verbose", ParamKind::Flag, Presence::Optional)
            .expect("failed to add param");
        assert_eq!(cfg.parse_env_args(), cfg.parse(std::env::args().skip(1)));

        // every token but the program name is accounted for at most once
        if let Ok(result) = cfg.parse_env_args() {
            let tokens = std::env::args().count() - 1;
            assert!(result.matches().len() + result.extras().len() <= tokens);
        }
    }
}
