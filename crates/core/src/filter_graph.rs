//! Typed ffmpeg filter graphs.
//!
//! Filters are assembled as values and serialised once, so escaping is
//! handled in a single place and graphs can be asserted on without running
//! ffmpeg.

use std::fmt;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A filter option value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    /// Rendered with at most six decimals, trailing zeros trimmed.
    Float(f64),
    /// Emitted verbatim. Only for values without graph-level metacharacters.
    Raw(String),
    /// An expression that may contain commas, wrapped in single quotes.
    Expr(String),
    /// Free text, escaped for the option level then quoted for the graph.
    Text(String),
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for FilterValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::Raw(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::Raw(v)
    }
}

/// Format a float for ffmpeg: fixed point, no exponent, no trailing zeros.
pub fn format_float(v: f64) -> String {
    let s = format!("{v:.6}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn escape_option_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => f.write_str(&format_float(*v)),
            Self::Raw(v) => f.write_str(v),
            Self::Expr(v) => f.write_str(&quote(v)),
            Self::Text(v) => f.write_str(&quote(&escape_option_text(v))),
        }
    }
}

// ---------------------------------------------------------------------------
// Filters and chains
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum FilterArg {
    Positional(FilterValue),
    Named(String, FilterValue),
}

/// One filter invocation, e.g. `scale=1280:720`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    name: String,
    args: Vec<FilterArg>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<FilterValue>) -> Self {
        self.args.push(FilterArg::Positional(value.into()));
        self
    }

    /// Append a `key=value` option.
    pub fn opt(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.args.push(FilterArg::Named(key.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            match arg {
                FilterArg::Positional(v) => write!(f, "{v}")?,
                FilterArg::Named(k, v) => write!(f, "{k}={v}")?,
            }
        }
        Ok(())
    }
}

/// Filters applied in sequence between labelled pads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterChain {
    inputs: Vec<String>,
    filters: Vec<Filter>,
    outputs: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input pad, e.g. `0:v` or `v1`.
    pub fn input(mut self, label: impl Into<String>) -> Self {
        self.inputs.push(label.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.inputs {
            write!(f, "[{label}]")?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{filter}")?;
        }
        for label in &self.outputs {
            write!(f, "[{label}]")?;
        }
        Ok(())
    }
}

/// A complete `-filter_complex` / `-vf` graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterGraph {
    chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain(mut self, chain: FilterChain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn chains(&self) -> &[FilterChain] {
        &self.chains
    }

    /// Number of filters named `name` across all chains.
    pub fn filter_count(&self, name: &str) -> usize {
        self.chains
            .iter()
            .flat_map(|c| c.filters.iter())
            .filter(|f| f.name == name)
            .count()
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{chain}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(1.6), "1.6");
        assert_eq!(format_float(2.0), "2");
        assert_eq!(format_float(0.0), "0");
        assert_eq!(format_float(1.0 / 3.0), "0.333333");
        assert_eq!(format_float(-0.0000001), "0");
    }

    #[test]
    fn filter_with_mixed_args() {
        let f = Filter::new("scale").arg(1280u32).arg(720u32);
        assert_eq!(f.to_string(), "scale=1280:720");

        let f = Filter::new("fps").opt("fps", 24u32);
        assert_eq!(f.to_string(), "fps=fps=24");

        assert_eq!(Filter::new("null").to_string(), "null");
    }

    #[test]
    fn expressions_are_quoted() {
        let f = Filter::new("drawtext").opt("enable", FilterValue::Expr("between(t,1,2)".into()));
        assert_eq!(f.to_string(), "drawtext=enable='between(t,1,2)'");
    }

    #[test]
    fn text_is_escaped_then_quoted() {
        let v = FilterValue::Text("it's 10:30".into());
        assert_eq!(v.to_string(), r"'it\'\''s 10\:30'");
        let plain = FilterValue::Text("hello world".into());
        assert_eq!(plain.to_string(), "'hello world'");
    }

    #[test]
    fn chains_join_into_graph() {
        let graph = FilterGraph::new()
            .chain(
                FilterChain::new()
                    .input("0:v")
                    .filter(Filter::new("setpts").arg("1.6*PTS"))
                    .filter(Filter::new("fps").arg(24u32))
                    .output("v"),
            )
            .chain(
                FilterChain::new()
                    .input("v")
                    .input("1:v")
                    .filter(
                        Filter::new("xfade")
                            .opt("transition", "fade")
                            .opt("duration", 1.0)
                            .opt("offset", 4.5),
                    )
                    .output("out"),
            );
        assert_eq!(
            graph.to_string(),
            "[0:v]setpts=1.6*PTS,fps=24[v];[v][1:v]xfade=transition=fade:duration=1:offset=4.5[out]"
        );
        assert_eq!(graph.filter_count("xfade"), 1);
        assert_eq!(graph.filter_count("fps"), 1);
    }
}
