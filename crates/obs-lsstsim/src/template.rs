//! `%(name)s`-style path templates.
//!
//! A [`PathTemplate`] is compiled once and then used in both directions:
//! [`PathTemplate::render`] fills the fields from a data ID, and
//! [`PathTemplate::scan`] walks a directory tree and recovers the field
//! values of every file whose relative path matches the template.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%\((\w+)\)([-#0 +]*)(\d*)(?:\.(\d+))?([diouxXeEfFgGcrs])")
        .expect("static regex is valid")
});

/// How a template field is formatted and matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `%c`, `%r`, `%s`.
    Text,
    /// `%d`, `%i`, `%o`, `%u`.
    Integer,
    /// `%x`, `%X`.
    Hex,
    /// `%e`, `%f`, `%g` and their upper-case forms.
    Float,
}

impl FieldKind {
    fn from_conversion(c: char) -> Self {
        match c {
            'c' | 'r' | 's' => Self::Text,
            'x' | 'X' => Self::Hex,
            'e' | 'E' | 'f' | 'F' | 'g' | 'G' => Self::Float,
            _ => Self::Integer,
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            Self::Text => ".+?",
            Self::Hex => r"[\dA-Fa-f]+?",
            Self::Integer | Self::Float => r"[\d.eE+-]+?",
        }
    }

    /// Whether values of this kind are stored as numbers.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Text)
    }
}

/// One `%(key)…` occurrence in a template.
#[derive(Debug, Clone)]
pub struct TemplateField {
    /// Unique name; repeated keys get a `_<n>` suffix.
    pub name: String,
    /// The data ID key the field reads.
    pub key: String,
    /// Formatting class.
    pub kind: FieldKind,
    conversion: char,
    zero_pad: bool,
    left_align: bool,
    width: usize,
    precision: Option<usize>,
}

impl TemplateField {
    fn format(&self, template: &str, value: &str) -> Result<String> {
        let bad = || Error::Template {
            template: template.to_string(),
            message: format!("value {value:?} for {} is not a {:?}", self.key, self.kind),
        };
        let body = match self.kind {
            FieldKind::Text => value.to_string(),
            FieldKind::Integer => {
                let v: i64 = value.trim().parse().map_err(|_| bad())?;
                if self.conversion == 'o' {
                    format!("{v:o}")
                } else {
                    v.to_string()
                }
            }
            FieldKind::Hex => {
                let v: i64 = value.trim().parse().map_err(|_| bad())?;
                if self.conversion == 'X' {
                    format!("{v:X}")
                } else {
                    format!("{v:x}")
                }
            }
            FieldKind::Float => {
                let v: f64 = value.trim().parse().map_err(|_| bad())?;
                match self.conversion {
                    'e' | 'E' => format!("{v:.prec$e}", prec = self.precision.unwrap_or(6)),
                    'f' | 'F' => format!("{v:.prec$}", prec = self.precision.unwrap_or(6)),
                    _ => v.to_string(),
                }
            }
        };
        let len = body.chars().count();
        if len >= self.width {
            return Ok(body);
        }
        let fill = self.width - len;
        Ok(if self.left_align {
            format!("{body}{}", " ".repeat(fill))
        } else if self.zero_pad && self.kind.is_numeric() {
            match body.strip_prefix('-') {
                Some(digits) => format!("-{}{digits}", "0".repeat(fill)),
                None => format!("{}{body}", "0".repeat(fill)),
            }
        } else {
            format!("{}{body}", " ".repeat(fill))
        })
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Field(usize),
}

/// A compiled path template.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    source: String,
    fields: Vec<TemplateField>,
    segments: Vec<Segment>,
    glob: String,
    regex: Regex,
}

impl PathTemplate {
    /// Compile a template such as
    /// `bias/imsim_0_R%(raft)s_S%(sensor)s_C%(channel)s_E000.fits`.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived matcher cannot be compiled.
    pub fn parse(template: &str) -> Result<Self> {
        let mut fields: Vec<TemplateField> = Vec::new();
        let mut segments = Vec::new();
        let mut glob = String::new();
        let mut re = String::from("^");
        let mut last = 0;
        let mut dup = 0;

        for caps in FIELD_RE.captures_iter(template) {
            let whole = caps.get(0).ok_or_else(|| Error::internal("empty template match"))?;
            let literal = &template[last..whole.start()];
            if !literal.is_empty() {
                segments.push(Segment::Literal(literal.to_string()));
                glob.push_str(&glob::Pattern::escape(literal));
                re.push_str(&regex::escape(literal));
            }
            last = whole.end();

            let key = caps[1].to_string();
            let mut name = key.clone();
            if fields.iter().any(|f| f.key == key) {
                name = format!("{key}_{dup}");
                dup += 1;
            }
            let flags = &caps[2];
            let conversion = caps[5].chars().next().unwrap_or('s');
            let kind = FieldKind::from_conversion(conversion);
            glob.push('*');
            re.push_str(&format!("(?P<{name}>{})", kind.pattern()));
            segments.push(Segment::Field(fields.len()));
            fields.push(TemplateField {
                name,
                key,
                kind,
                conversion,
                zero_pad: flags.contains('0'),
                left_align: flags.contains('-'),
                width: caps[3].parse().unwrap_or(0),
                precision: caps.get(4).and_then(|m| m.as_str().parse().ok()),
            });
        }
        let tail = &template[last..];
        if !tail.is_empty() {
            segments.push(Segment::Literal(tail.to_string()));
            glob.push_str(&glob::Pattern::escape(tail));
            re.push_str(&regex::escape(tail));
        }
        re.push('$');

        let regex = Regex::new(&re).map_err(|e| Error::Template {
            template: template.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            source: template.to_string(),
            fields,
            segments,
            glob,
            regex,
        })
    }

    /// The template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Fields in template order, including suffixed duplicates.
    #[must_use]
    pub fn fields(&self) -> &[TemplateField] {
        &self.fields
    }

    /// Fields in template order with duplicates removed.
    pub fn unique_fields(&self) -> impl Iterator<Item = &TemplateField> {
        self.fields.iter().filter(|f| f.name == f.key)
    }

    /// The glob pattern matching candidate paths, relative to a scan root.
    #[must_use]
    pub fn glob_pattern(&self) -> &str {
        &self.glob
    }

    /// Substitute field values.
    ///
    /// # Errors
    ///
    /// Returns an error if a key is missing or a numeric field has a
    /// non-numeric value.
    pub fn render(&self, values: &BTreeMap<String, String>) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(i) => {
                    let field = &self.fields[*i];
                    let value = values.get(&field.key).ok_or_else(|| Error::Template {
                        template: self.source.clone(),
                        message: format!("no value for {}", field.key),
                    })?;
                    out.push_str(&field.format(&self.source, value)?);
                }
            }
        }
        Ok(out)
    }

    /// Match a relative path, returning its field values keyed by data ID
    /// key. A path that repeats a key with different values does not match.
    #[must_use]
    pub fn match_path(&self, relative: &str) -> Option<BTreeMap<String, String>> {
        let caps = self.regex.captures(relative)?;
        let mut values = BTreeMap::new();
        for field in &self.fields {
            let value = caps.name(&field.name)?.as_str();
            match values.get(&field.key) {
                Some(seen) if seen != value => return None,
                Some(_) => {}
                None => {
                    values.insert(field.key.clone(), value.to_string());
                }
            }
        }
        Some(values)
    }

    /// Find every file under `root` whose relative path matches.
    ///
    /// Unreadable entries and glob hits the template rejects are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be turned into a glob pattern.
    pub fn scan(&self, root: &Path) -> Result<Vec<(PathBuf, BTreeMap<String, String>)>> {
        let root_str = root.to_string_lossy();
        let pattern = format!("{}/{}", glob::Pattern::escape(&root_str), self.glob);
        let mut found = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("Error accessing {}: {e}", e.path().display());
                    continue;
                }
            };
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            match self.match_path(&relative) {
                Some(values) => found.push((path, values)),
                None => debug!(path = %relative, template = %self.source, "Path does not match template"),
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "raw/v%(visit)d-f%(filter)s/E%(snap)03d/R%(raft)s/S%(sensor)s/\
                       imsim_%(visit)d_R%(raft)s_S%(sensor)s_C%(channel)s_E%(snap)03d.fits";

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_parse_fields() {
        let t = PathTemplate::parse(RAW).unwrap();
        let names: Vec<&str> = t.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "visit", "filter", "snap", "raft", "sensor", "visit_0", "raft_1", "sensor_2",
                "channel", "snap_3"
            ]
        );
        let unique: Vec<&str> = t.unique_fields().map(|f| f.key.as_str()).collect();
        assert_eq!(unique, ["visit", "filter", "snap", "raft", "sensor", "channel"]);
        assert_eq!(t.fields()[0].kind, FieldKind::Integer);
        assert_eq!(t.fields()[1].kind, FieldKind::Text);
    }

    #[test]
    fn test_glob_pattern() {
        let t = PathTemplate::parse("flat_%(filter)s/imsim_2_R%(raft)s.fits").unwrap();
        assert_eq!(t.glob_pattern(), "flat_*/imsim_2_R*.fits");
    }

    #[test]
    fn test_render_zero_pads() {
        let t = PathTemplate::parse(RAW).unwrap();
        let path = t
            .render(&values(&[
                ("visit", "85471048"),
                ("filter", "r"),
                ("snap", "1"),
                ("raft", "22"),
                ("sensor", "11"),
                ("channel", "05"),
            ]))
            .unwrap();
        assert_eq!(
            path,
            "raw/v85471048-fr/E001/R22/S11/imsim_85471048_R22_S11_C05_E001.fits"
        );
    }

    #[test]
    fn test_render_missing_key() {
        let t = PathTemplate::parse("calexp/v%(visit)d.fits").unwrap();
        let err = t.render(&BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("no value for visit"));
    }

    #[test]
    fn test_render_rejects_non_numeric() {
        let t = PathTemplate::parse("v%(visit)d").unwrap();
        assert!(t.render(&values(&[("visit", "abc")])).is_err());
    }

    #[test]
    fn test_render_hex_and_float() {
        let t = PathTemplate::parse("%(a)04x_%(b).2f_%(c)-3s|").unwrap();
        let out = t
            .render(&values(&[("a", "255"), ("b", "1.5"), ("c", "z")]))
            .unwrap();
        assert_eq!(out, "00ff_1.50_z  |");
    }

    #[test]
    fn test_match_path() {
        let t = PathTemplate::parse(RAW).unwrap();
        let got = t
            .match_path("raw/v1-fr/E000/R22/S11/imsim_1_R22_S11_C17_E000.fits")
            .unwrap();
        assert_eq!(got["visit"], "1");
        assert_eq!(got["snap"], "000");
        assert_eq!(got["channel"], "17");
    }

    #[test]
    fn test_match_path_requires_repeats_to_agree() {
        let t = PathTemplate::parse(RAW).unwrap();
        assert!(t
            .match_path("raw/v1-fr/E000/R22/S11/imsim_2_R22_S11_C17_E000.fits")
            .is_none());
    }

    #[test]
    fn test_scan() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("bias");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("imsim_0_R22_S11_C00_E000.fits"), b"").unwrap();
        std::fs::write(sub.join("imsim_0_R22_S11_C01_E000.fits"), b"").unwrap();
        std::fs::write(sub.join("notes.txt"), b"").unwrap();

        let t = PathTemplate::parse("bias/imsim_0_R%(raft)s_S%(sensor)s_C%(channel)s_E000.fits")
            .unwrap();
        let mut found = t.scan(dir.path()).unwrap();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].1["channel"], "00");
        assert_eq!(found[1].1["channel"], "01");
    }
}
