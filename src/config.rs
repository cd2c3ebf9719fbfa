use std::env;

pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// Host stack per nested call, with room to spare for unoptimised builds.
const STACK_PER_CALL: usize = 32 * 1024;
const BASE_STACK: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    /// How deeply calls may nest before evaluation fails with a stack overflow.
    pub max_depth: usize,
    /// Report a failing top-level form and carry on with the next one, instead of stopping.
    pub recover: bool,
    pub load_prelude: bool,
    /// Symbols which spell `lambda`.
    pub lambda_spellings: Vec<String>,
    /// Tried as a suffix when `require` can't find a file by its bare name.
    pub extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            recover: false,
            load_prelude: true,
            lambda_spellings: vec!["lambda".into(), "λ".into()],
            extension: "lispy".into(),
        }
    }
}

fn enabled(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Config {
    /// Enough host stack to evaluate `max_depth` nested calls.
    pub fn stack_size(&self) -> usize {
        BASE_STACK.saturating_add(self.max_depth.saturating_mul(STACK_PER_CALL))
    }

    /// The defaults, overridden by `LISPY_MAX_DEPTH`, `LISPY_RECOVER` and `LISPY_NO_PRELUDE`.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    pub(crate) fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(depth) = lookup("LISPY_MAX_DEPTH") {
            match depth.trim().parse() {
                Ok(depth) => self.max_depth = depth,
                Err(e) => log::warn!(
                    "ignoring LISPY_MAX_DEPTH={:?}: {}; using {}",
                    depth,
                    e,
                    self.max_depth
                ),
            }
        }
        if let Some(recover) = lookup("LISPY_RECOVER") {
            self.recover = enabled(&recover);
        }
        if let Some(no_prelude) = lookup("LISPY_NO_PRELUDE") {
            self.load_prelude = !enabled(&no_prelude);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::default().with_overrides(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = with(&[]);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert!(!config.recover);
        assert!(config.load_prelude);
        assert_eq!(config.lambda_spellings, vec!["lambda", "λ"]);
    }

    #[test]
    fn overrides() {
        let config = with(&[
            ("LISPY_MAX_DEPTH", "64"),
            ("LISPY_RECOVER", "yes"),
            ("LISPY_NO_PRELUDE", "1"),
        ]);
        assert_eq!(config.max_depth, 64);
        assert!(config.recover);
        assert!(!config.load_prelude);
    }

    #[test]
    fn stack_grows_with_depth() {
        let shallow = with(&[("LISPY_MAX_DEPTH", "10")]).stack_size();
        let deep = with(&[("LISPY_MAX_DEPTH", "10000")]).stack_size();
        assert!(deep > shallow);
        assert!(deep >= 10000 * STACK_PER_CALL);
        assert_eq!(with(&[("LISPY_MAX_DEPTH", &usize::MAX.to_string())]).stack_size(), usize::MAX);
    }

    #[test]
    fn bad_depth_is_ignored() {
        assert_eq!(with(&[("LISPY_MAX_DEPTH", "deep")]).max_depth, DEFAULT_MAX_DEPTH);
    }
}
