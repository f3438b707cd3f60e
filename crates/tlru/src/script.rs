//! Replay scripts: a JSON list of get/put operations and the machine that
//! runs them against an LRU cache

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tinylru::{CacheConfig, CacheStats, LruCache};
use tracing::info;

/// A key or value in a script
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Token {
    Int(i64),
    Str(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// One scripted cache call
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Op {
    Get { key: Token },
    Put { key: Token, value: Token },
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Get { key } => write!(f, "get({})", key),
            Op::Put { key, value } => write!(f, "put({}, {})", key, value),
        }
    }
}

/// A parsed replay script
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Capacity to replay with, unless overridden on the command line
    #[serde(default)]
    pub capacity: Option<usize>,
    pub ops: Vec<Op>,
}

impl Script {
    /// Parse a script from JSON text
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("malformed replay script")
    }

    /// Load a script from a file, or from stdin when `path` is `-`
    pub fn load(path: &Path) -> Result<Self> {
        let text = if path == Path::new("-") {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read script from stdin")?;
            buf
        } else {
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read script {}", path.display()))?
        };
        Self::parse(&text)
    }

    /// Pick the cache config: the command-line capacity wins over the script's
    pub fn config(&self, capacity_override: Option<usize>) -> Result<CacheConfig> {
        let Some(capacity) = capacity_override.or(self.capacity) else {
            bail!("no capacity given: set \"capacity\" in the script or pass --capacity");
        };
        let config = CacheConfig::new(capacity);
        config.validate().context("invalid cache capacity")?;
        Ok(config)
    }
}

/// Result of applying one [`Op`]
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `get` found a value
    Hit(Token),
    /// `get` found nothing
    Miss,
    /// `put` stored its value, possibly pushing out the LRU entry
    Stored { evicted: Option<(Token, Token)> },
}

/// Cache plus counters for a replay run
pub struct Replay {
    cache: LruCache<Token, Token>,
    stats: CacheStats,
}

impl Replay {
    /// Create an empty cache for a run
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Ok(Self {
            cache: LruCache::from_config(config)?,
            stats: CacheStats::new(),
        })
    }

    /// Run one operation against the cache, updating the counters
    pub fn apply(&mut self, op: &Op) -> Outcome {
        match op {
            Op::Get { key } => {
                let value = self.cache.get(key).cloned();
                self.stats.record_lookup(value.is_some());
                value.map_or(Outcome::Miss, Outcome::Hit)
            }
            Op::Put { key, value } => {
                let is_new = !self.cache.contains(key);
                let evicted = self.cache.push(key.clone(), value.clone());
                if is_new {
                    self.stats.record_insert(evicted.is_some());
                }
                Outcome::Stored { evicted }
            }
        }
    }

    /// The cache in its current state
    pub fn cache(&self) -> &LruCache<Token, Token> {
        &self.cache
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

/// What to print besides the `get` results
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Log the MRU-to-LRU order after every operation
    pub show_state: bool,
    /// Write a JSON statistics line after the last operation
    pub print_stats: bool,
}

/// Replay `script` and write one line per `get` to `out`
///
/// A hit prints the JSON value, a miss prints `null`, a `put` prints nothing.
pub fn run<W: Write>(
    script: &Script,
    config: &CacheConfig,
    options: RunOptions,
    out: &mut W,
) -> Result<Replay> {
    let mut replay = Replay::new(config)?;

    for op in &script.ops {
        match replay.apply(op) {
            Outcome::Hit(value) => {
                writeln!(out, "{}", serde_json::to_string(&value)?)?;
            }
            Outcome::Miss => writeln!(out, "null")?,
            Outcome::Stored { evicted } => {
                if let Some((key, _)) = evicted.filter(|_| options.show_state) {
                    info!("{} evicted {}", op, key);
                }
            }
        }

        if options.show_state {
            info!("{} -> {:?}", op, replay.cache());
        }
    }

    if options.print_stats {
        let stats = replay.stats().snapshot();
        writeln!(out, "{}", serde_json::to_string(&stats)?)?;
        info!("{}", stats);
    }

    out.flush().context("failed to flush output")?;
    Ok(replay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn int(n: i64) -> Token {
        Token::Int(n)
    }

    fn outcomes(script: &Script, capacity: Option<usize>) -> Vec<Outcome> {
        let mut replay = Replay::new(&script.config(capacity).unwrap()).unwrap();
        script.ops.iter().map(|op| replay.apply(op)).collect()
    }

    const DEMO: &str = r#"{
        "capacity": 2,
        "ops": [
            {"op": "put", "key": 1, "value": 1},
            {"op": "put", "key": 2, "value": 2},
            {"op": "get", "key": 1},
            {"op": "put", "key": 3, "value": 3},
            {"op": "get", "key": 2},
            {"op": "put", "key": 4, "value": 4},
            {"op": "get", "key": 1},
            {"op": "get", "key": 3},
            {"op": "get", "key": 4}
        ]
    }"#;

    #[test]
    fn test_parse_script() {
        let script = Script::parse(DEMO).unwrap();

        assert_eq!(script.capacity, Some(2));
        assert_eq!(script.ops.len(), 9);
        assert_eq!(
            script.ops[0],
            Op::Put {
                key: int(1),
                value: int(1)
            }
        );
    }

    #[test]
    fn test_replay_demo() {
        let script = Script::parse(DEMO).unwrap();
        let gets: Vec<_> = outcomes(&script, None)
            .into_iter()
            .filter(|o| !matches!(o, Outcome::Stored { .. }))
            .collect();

        assert_eq!(
            gets,
            vec![
                Outcome::Hit(int(1)),
                Outcome::Miss,
                Outcome::Miss,
                Outcome::Hit(int(3)),
                Outcome::Hit(int(4)),
            ]
        );
    }

    #[test]
    fn test_replay_reports_evictions() {
        let script = Script::parse(DEMO).unwrap();
        let outcomes = outcomes(&script, None);

        assert_eq!(
            outcomes[3],
            Outcome::Stored {
                evicted: Some((int(2), int(2)))
            }
        );
    }

    #[test]
    fn test_string_tokens() {
        let script = Script::parse(
            r#"{"ops": [
                {"op": "put", "key": "a", "value": "x"},
                {"op": "get", "key": "a"}
            ]}"#,
        )
        .unwrap();

        let outcomes = outcomes(&script, Some(1));
        assert_eq!(outcomes[1], Outcome::Hit(Token::Str("x".into())));
        assert_eq!(Token::Str("x".into()).to_string(), "\"x\"");
    }

    #[test]
    fn test_capacity_override() {
        let script = Script::parse(DEMO).unwrap();

        assert_eq!(script.config(None).unwrap().capacity, 2);
        assert_eq!(script.config(Some(5)).unwrap().capacity, 5);
        assert!(script.config(Some(0)).is_err());
    }

    #[test]
    fn test_zero_capacity_has_context() {
        let script = Script::parse(DEMO).unwrap();
        let err = script.config(Some(0)).unwrap_err();

        assert_eq!(err.to_string(), "invalid cache capacity");
        assert_eq!(
            format!("{:#}", err),
            "invalid cache capacity: Invalid capacity: 0 (must be at least 1)"
        );
    }

    fn render(script: &Script, options: RunOptions) -> String {
        let config = script.config(None).unwrap();
        let mut out = Vec::new();
        run(script, &config, options, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_run_prints_one_line_per_get() {
        let script = Script::parse(DEMO).unwrap();
        assert_eq!(render(&script, RunOptions::default()), "1\nnull\nnull\n3\n4\n");
    }

    #[test]
    fn test_run_prints_string_values_as_json() {
        let script = Script::parse(
            r#"{"capacity": 1, "ops": [
                {"op": "put", "key": "a", "value": "x"},
                {"op": "put", "key": "b", "value": "y"},
                {"op": "get", "key": "a"},
                {"op": "get", "key": "b"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(render(&script, RunOptions::default()), "null\n\"y\"\n");
    }

    #[test]
    fn test_run_with_stats_line() {
        let script = Script::parse(DEMO).unwrap();
        let options = RunOptions {
            show_state: true,
            print_stats: true,
        };
        let output = render(&script, options);
        let lines: Vec<_> = output.lines().collect();

        assert_eq!(lines.len(), 6);
        assert_eq!(&lines[..5], ["1", "null", "null", "3", "4"]);

        let stats: serde_json::Value = serde_json::from_str(lines[5]).unwrap();
        assert_eq!(stats["hits"], 3);
        assert_eq!(stats["misses"], 2);
        assert_eq!(stats["inserts"], 4);
        assert_eq!(stats["evictions"], 2);
        assert_eq!(stats["hit_ratio"], 0.6);
    }

    #[test]
    fn test_run_without_gets_prints_nothing() {
        let script = Script::parse(
            r#"{"capacity": 2, "ops": [{"op": "put", "key": 1, "value": 1}]}"#,
        )
        .unwrap();

        assert_eq!(render(&script, RunOptions::default()), "");
    }

    #[test]
    fn test_missing_capacity() {
        let script = Script::parse(r#"{"ops": []}"#).unwrap();
        let err = script.config(None).unwrap_err();
        assert!(err.to_string().contains("no capacity"));
    }

    #[test]
    fn test_malformed_script() {
        assert!(Script::parse(r#"{"ops": [{"op": "delete", "key": 1}]}"#).is_err());
        assert!(Script::parse("not json").is_err());
    }

    #[test]
    fn test_replay_stats() {
        let script = Script::parse(DEMO).unwrap();
        let mut replay = Replay::new(&script.config(None).unwrap()).unwrap();
        for op in &script.ops {
            replay.apply(op);
        }

        let stats = replay.stats().snapshot();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.inserts, 4);
        assert_eq!(stats.evictions, 2);
        assert_eq!(replay.cache().len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(DEMO.as_bytes()).unwrap();

        let script = Script::load(file.path()).unwrap();
        assert_eq!(script.ops.len(), 9);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Script::load(Path::new("/nonexistent/script.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read script"));
    }
}
