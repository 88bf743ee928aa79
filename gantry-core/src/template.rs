//! 路径模板
//!
//! 模板示例：
//!
//! - `/users/{id}` 或 `/users/:id` - 命名参数
//! - `/users/{id}.json` - 带后缀的命名参数，只匹配 `42.json`，绑定 `id = "42"`
//! - `/search?query` - 只有请求携带 `query` 查询参数时才匹配
//!
//! 模板的段数是固定的，不支持通配符。

use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// 参数段的匹配模式
///
/// 以正则源码作为路由树中的键：源码相同的两个参数段视为同一分支。
#[derive(Debug, Clone)]
pub struct SegmentPattern {
    source: String,
    regex: Regex,
}

impl SegmentPattern {
    fn new(source: String) -> Result<Self, regex::Error> {
        let regex = Regex::new(&source)?;
        Ok(Self { source, regex })
    }

    /// 任意非空段
    fn any() -> Result<Self, regex::Error> {
        Self::new("^(.+)$".to_string())
    }

    /// `<value>.<suffix>` 形式的段
    fn with_suffix(suffix: &str) -> Result<Self, regex::Error> {
        Self::new(format!(r"^(.+)\.{}$", regex::escape(suffix)))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, segment: &str) -> bool {
        self.regex.is_match(segment)
    }

    /// 返回第一个捕获组
    pub fn capture<'s>(&self, segment: &'s str) -> Option<&'s str> {
        self.regex
            .captures(segment)
            .and_then(|captures| captures.get(1))
            .map(|value| value.as_str())
    }
}

impl PartialEq for SegmentPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for SegmentPattern {}

/// 模板中的一段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param {
        name: String,
        pattern: SegmentPattern,
    },
    ParamWithSuffix {
        name: String,
        suffix: String,
        pattern: SegmentPattern,
    },
}

impl Segment {
    pub fn pattern(&self) -> Option<&SegmentPattern> {
        match self {
            Segment::Literal(_) => None,
            Segment::Param { pattern, .. } | Segment::ParamWithSuffix { pattern, .. } => {
                Some(pattern)
            }
        }
    }

    pub fn parameter_name(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Param { name, .. } | Segment::ParamWithSuffix { name, .. } => Some(name),
        }
    }

    /// 形状相同：常量段文本相同，或参数段模式相同（忽略参数名）
    pub fn same_shape(&self, other: &Segment) -> bool {
        match (self, other) {
            (Segment::Literal(a), Segment::Literal(b)) => a == b,
            (Segment::Literal(_), _) | (_, Segment::Literal(_)) => false,
            (a, b) => a.pattern() == b.pattern(),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(text) => write!(f, "{text}"),
            Segment::Param { name, .. } => write!(f, "{{{name}}}"),
            Segment::ParamWithSuffix { name, suffix, .. } => write!(f, "{{{name}}}.{suffix}"),
        }
    }
}

/// 模板解析错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TemplateError(String);

/// 模板展开错误（客户端侧）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("No value for path parameter '{0}'")]
pub struct MissingPathParameter(pub String);

/// 解析后的路径模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
    required_query_param: Option<String>,
}

impl PathTemplate {
    /// 解析模板
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let (path, required_query_param) = split_required_query_param(source);
        if let Some(name) = &required_query_param {
            if name.is_empty() || name.contains(['&', '=', '/']) {
                return Err(TemplateError(format!(
                    "invalid required query parameter '{name}'"
                )));
            }
        }

        let segments = path
            .split('/')
            .filter(|component| !component.is_empty())
            .map(parse_segment)
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = Vec::new();
        for name in segments.iter().filter_map(Segment::parameter_name) {
            if seen.contains(&name) {
                return Err(TemplateError(format!("duplicate path parameter '{name}'")));
            }
            seen.push(name);
        }

        Ok(Self {
            source: source.to_string(),
            segments,
            required_query_param,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn required_query_param(&self) -> Option<&str> {
        self.required_query_param.as_deref()
    }

    /// 模板声明的全部参数名
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(Segment::parameter_name)
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameter_names().any(|candidate| candidate == name)
    }

    /// 段形状相同（参数名不计）
    pub fn same_shape(&self, other: &PathTemplate) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.same_shape(b))
    }

    /// 与请求路径段匹配，成功时返回绑定的参数
    pub fn match_segments<S: AsRef<str>>(&self, segments: &[S]) -> Option<HashMap<String, String>> {
        let segments: Vec<&str> = segments.iter().map(AsRef::as_ref).collect();
        let segments: &[&str] = match segments.as_slice() {
            [""] if self.segments.is_empty() => &[],
            other => other,
        };
        if segments.len() != self.segments.len() {
            return None;
        }

        let mut parameters = HashMap::new();
        for (segment, value) in self.segments.iter().zip(segments) {
            match segment {
                Segment::Literal(text) => {
                    if text != value {
                        return None;
                    }
                }
                Segment::Param { name, pattern }
                | Segment::ParamWithSuffix { name, pattern, .. } => {
                    let captured = pattern.capture(value)?;
                    parameters.insert(name.clone(), captured.to_string());
                }
            }
        }
        Some(parameters)
    }

    /// 用参数值展开为请求路径（值会被百分号编码）
    pub fn expand(
        &self,
        parameters: &HashMap<String, String>,
    ) -> Result<String, MissingPathParameter> {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Param { name, .. } => path.push_str(&encode(lookup(parameters, name)?)),
                Segment::ParamWithSuffix { name, suffix, .. } => {
                    path.push_str(&encode(lookup(parameters, name)?));
                    path.push('.');
                    path.push_str(suffix);
                }
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        Ok(path)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// 拆出第一个未转义 `?` 之后的必需查询参数
fn split_required_query_param(source: &str) -> (String, Option<String>) {
    let mut escaped = false;
    for (index, c) in source.char_indices() {
        match c {
            '\\' => escaped = !escaped,
            '?' if !escaped => {
                let path = source[..index].replace("\\?", "?");
                return (path, Some(source[index + 1..].to_string()));
            }
            _ => escaped = false,
        }
    }
    (source.replace("\\?", "?"), None)
}

fn parse_segment(component: &str) -> Result<Segment, TemplateError> {
    let Some((name, suffix)) = split_parameter(component) else {
        if component.contains(['{', '}']) {
            return Err(TemplateError(format!("malformed path parameter '{component}'")));
        }
        return Ok(Segment::Literal(component.to_string()));
    };

    let name = name.to_string();
    let invalid = |e: regex::Error| TemplateError(e.to_string());

    match suffix {
        Some(suffix) => Ok(Segment::ParamWithSuffix {
            name,
            suffix: suffix.to_string(),
            pattern: SegmentPattern::with_suffix(suffix).map_err(invalid)?,
        }),
        None => Ok(Segment::Param {
            name,
            pattern: SegmentPattern::any().map_err(invalid)?,
        }),
    }
}

/// `{name}` 或 `:name`，可带 `.suffix`；不是参数段时返回 `None`
fn split_parameter(component: &str) -> Option<(&str, Option<&str>)> {
    let (name, rest) = match component.strip_prefix('{') {
        Some(inner) => inner.split_once('}')?,
        None => {
            let inner = component.strip_prefix(':')?;
            match inner.find('.') {
                Some(dot) => inner.split_at(dot),
                None => (inner, ""),
            }
        }
    };

    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    if name.is_empty() || !name.chars().all(|c| is_word(c) || c == '-') {
        return None;
    }

    let suffix = match rest {
        "" => None,
        rest => {
            let suffix = rest.strip_prefix('.')?;
            if suffix.is_empty() || !suffix.chars().all(is_word) {
                return None;
            }
            Some(suffix)
        }
    };
    Some((name, suffix))
}

fn lookup<'a>(
    parameters: &'a HashMap<String, String>,
    name: &str,
) -> Result<&'a str, MissingPathParameter> {
    parameters
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| MissingPathParameter(name.to_string()))
}

fn encode(value: &str) -> String {
    percent_encoding::utf8_percent_encode(value, SEGMENT).to_string()
}

/// 路径段中需要编码的字符
const SEGMENT: &percent_encoding::AsciiSet = &percent_encoding::CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[cfg(test)]
mod tests {
    use super::*;

    fn names(template: &PathTemplate) -> Vec<&str> {
        template.parameter_names().collect()
    }

    #[test]
    fn test_parse_literals_and_params() {
        let template = PathTemplate::parse("/users/{id}/orders/:orderId").unwrap();

        assert_eq!(template.segments().len(), 4);
        assert_eq!(template.segments()[0], Segment::Literal("users".to_string()));
        assert_eq!(names(&template), vec!["id", "orderId"]);
        assert_eq!(template.required_query_param(), None);
    }

    #[test]
    fn test_parse_suffix_param() {
        let template = PathTemplate::parse("/users/{id}.json").unwrap();
        let segment = &template.segments()[1];

        assert!(matches!(segment, Segment::ParamWithSuffix { suffix, .. } if suffix == "json"));
        assert_eq!(segment.pattern().unwrap().source(), r"^(.+)\.json$");
        assert_eq!(segment.to_string(), "{id}.json");
    }

    #[test]
    fn test_parse_required_query_param() {
        let template = PathTemplate::parse("/search?query").unwrap();
        assert_eq!(template.segments(), &[Segment::Literal("search".to_string())]);
        assert_eq!(template.required_query_param(), Some("query"));

        let escaped = PathTemplate::parse(r"/what\?/now?x").unwrap();
        assert_eq!(escaped.segments()[0], Segment::Literal("what?".to_string()));
        assert_eq!(escaped.required_query_param(), Some("x"));
    }

    #[test]
    fn test_root_has_no_segments() {
        assert!(PathTemplate::parse("/").unwrap().segments().is_empty());
        assert!(PathTemplate::parse("").unwrap().segments().is_empty());
        assert!(PathTemplate::parse("/?debug").unwrap().segments().is_empty());
    }

    #[test]
    fn test_invalid_templates() {
        assert!(PathTemplate::parse("/users/{id").is_err());
        assert!(PathTemplate::parse("/a/{id}/b/{id}").is_err());
        assert!(PathTemplate::parse("/search?").is_err());
    }

    #[test]
    fn test_suffix_matching() {
        let template = PathTemplate::parse("/users/{id}.json").unwrap();

        let bound = template.match_segments(&["users", "42.json"]).unwrap();
        assert_eq!(bound["id"], "42");
        assert!(template.match_segments(&["users", "42"]).is_none());
        assert!(template.match_segments(&["users", "42.xml"]).is_none());
    }

    #[test]
    fn test_segment_count_must_match() {
        let template = PathTemplate::parse("/users/{id}").unwrap();
        assert!(template.match_segments(&["users"]).is_none());
        assert!(template.match_segments(&["users", "1", "x"]).is_none());
        assert!(PathTemplate::parse("/").unwrap().match_segments(&[""]).is_some());
    }

    #[test]
    fn test_same_shape_ignores_names() {
        let a = PathTemplate::parse("/users/{id}").unwrap();
        let b = PathTemplate::parse("/users/:name").unwrap();
        let c = PathTemplate::parse("/users/{id}.json").unwrap();

        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
    }

    #[test]
    fn test_expand() {
        let template = PathTemplate::parse("/users/{id}/files/{name}.json?download").unwrap();
        let parameters = HashMap::from([
            ("id".to_string(), "7".to_string()),
            ("name".to_string(), "a b/c".to_string()),
        ]);

        assert_eq!(template.expand(&parameters).unwrap(), "/users/7/files/a%20b%2Fc.json");
        assert_eq!(
            template.expand(&HashMap::new()).unwrap_err(),
            MissingPathParameter("id".to_string())
        );
        assert_eq!(PathTemplate::parse("/").unwrap().expand(&HashMap::new()).unwrap(), "/");
    }
}
