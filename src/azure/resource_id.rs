/// Azure Resource Manager resource identifier parsing
use crate::error::ParseError;

/// A parsed ARM resource identifier
///
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}`,
/// optionally followed by further `{type}/{name}` pairs for child resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub provider: String,
    /// Resource type and name pairs, outermost first
    pub resources: Vec<(String, String)>,
}

impl ResourceId {
    /// Parse a fully-qualified resource identifier
    pub fn parse(id: &str) -> Result<Self, ParseError> {
        let fail = |reason: &str| ParseError {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        let path = id
            .strip_prefix('/')
            .ok_or_else(|| fail("identifier must start with '/'"))?;
        let path = path.strip_suffix('/').unwrap_or(path);
        let segments: Vec<&str> = path.split('/').collect();

        if segments.iter().any(|s| s.is_empty()) {
            return Err(fail("identifier contains an empty segment"));
        }

        let mut segments = segments.into_iter();

        let subscription_id = expect_pair(&mut segments, "subscriptions").map_err(|r| fail(&r))?;
        let resource_group = expect_pair(&mut segments, "resourceGroups").map_err(|r| fail(&r))?;
        let provider = expect_pair(&mut segments, "providers").map_err(|r| fail(&r))?;

        let rest: Vec<&str> = segments.collect();
        if rest.is_empty() {
            return Err(fail("missing resource type and name"));
        }
        if rest.len() % 2 != 0 {
            return Err(fail("resource type without a name"));
        }

        let resources = rest
            .chunks(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();

        Ok(Self {
            subscription_id,
            resource_group,
            provider,
            resources,
        })
    }
}

/// Extract the resource group a resource belongs to
pub fn parse_scope(id: &str) -> Result<String, ParseError> {
    ResourceId::parse(id).map(|resource| resource.resource_group)
}

fn expect_pair<'a, I>(segments: &mut I, key: &str) -> Result<String, String>
where
    I: Iterator<Item = &'a str>,
{
    match segments.next() {
        Some(found) if found.eq_ignore_ascii_case(key) => segments
            .next()
            .map(str::to_string)
            .ok_or_else(|| format!("missing value for '{}'", key)),
        Some(found) => Err(format!("expected '{}', found '{}'", key, found)),
        None => Err(format!("missing '{}' segment", key)),
    }
}
