//! CV-016: Identifier naming for generated programs.
//!
//! Case conversion, class and function names for resource types, and a
//! per-scope table that hands out unique identifiers.

use crate::il::NodeKey;
use rustc_hash::{FxHashMap, FxHashSet};

/// `most_recent` → `mostRecent`.
pub fn camel_case(name: &str) -> String {
    let pascal = pascal_case(name);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// `s3_bucket` → `S3Bucket`.
pub fn pascal_case(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c == '.' || c == ' ')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// `mostRecent` → `most_recent`, `vpc-id` → `vpc_id`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c == '-' || c == '.' || c == ' ' {
            out.push('_');
            prev_lower = false;
        } else if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// True for `[A-Za-z_$][A-Za-z0-9_$]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Where a resource type lives in its provider package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    /// Package module (`s3`); `None` for top-level members
    pub module: Option<String>,
    /// Class or function name (`Bucket`, `getAmi`)
    pub member: String,
}

impl TypeName {
    /// `s3.Bucket` or `Bucket`.
    pub fn qualified(&self) -> String {
        match &self.module {
            Some(m) => format!("{}.{}", m, self.member),
            None => self.member.clone(),
        }
    }
}

/// Module and member of a schema token `package:module/member:Name`.
fn token_name(token: &str) -> Option<TypeName> {
    let mut parts = token.split(':');
    let (_package, middle, member) = (parts.next()?, parts.next()?, parts.next()?);
    if member.is_empty() || parts.next().is_some() {
        return None;
    }
    let module = middle.split('/').next().filter(|m| !m.is_empty() && *m != "index");
    Some(TypeName {
        module: module.map(str::to_string),
        member: member.to_string(),
    })
}

/// Split `aws_s3_bucket` into module `s3` and rest `bucket`.
fn derived_parts(kind: &str) -> Option<(Option<String>, String)> {
    let (_provider, rest) = kind.split_once('_')?;
    let (module, member) = match rest.split_once('_') {
        Some((m, r)) if !r.is_empty() => (Some(m.to_string()), r.to_string()),
        _ => (None, rest.to_string()),
    };
    if member.is_empty() {
        return None;
    }
    Some((module, member))
}

/// Class of a managed resource: the schema token when present, else derived
/// from the type (`aws_s3_bucket` → `s3.Bucket`).
pub fn resource_class(kind: &str, token: Option<&str>) -> Option<TypeName> {
    if let Some(name) = token.and_then(token_name) {
        return Some(name);
    }
    let (module, member) = derived_parts(kind)?;
    Some(TypeName {
        module,
        member: pascal_case(&member),
    })
}

/// Invoke function of a data source, camelCased (`aws_ami` → `getAmi`).
pub fn data_function(kind: &str, token: Option<&str>) -> Option<TypeName> {
    if let Some(name) = token.and_then(token_name) {
        return Some(TypeName {
            member: camel_case(&name.member),
            ..name
        });
    }
    let (module, member) = derived_parts(kind)?;
    Some(TypeName {
        module,
        member: format!("get{}", pascal_case(&member)),
    })
}

/// Unique identifiers within one scope.
#[derive(Debug, Default)]
pub struct Names {
    taken: FxHashSet<String>,
    assigned: FxHashMap<NodeKey, String>,
}

impl Names {
    pub fn new<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            taken: reserved.into_iter().map(str::to_string).collect(),
            assigned: FxHashMap::default(),
        }
    }

    /// Reserve `base` (or `base2`, `base3`, ...) for `key`.
    pub fn assign(&mut self, key: NodeKey, base: &str) -> String {
        if let Some(existing) = self.assigned.get(&key) {
            return existing.clone();
        }
        let base = if base.is_empty() { "_" } else { base };
        let mut candidate = base.to_string();
        let mut n = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{}{}", base, n);
            n += 1;
        }
        self.taken.insert(candidate.clone());
        self.assigned.insert(key, candidate.clone());
        candidate
    }

    pub fn get(&self, key: &NodeKey) -> Option<&str> {
        self.assigned.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cv016_case_conversion() {
        assert_eq!(camel_case("most_recent"), "mostRecent");
        assert_eq!(camel_case("vpc-id"), "vpcId");
        assert_eq!(camel_case("aws.west"), "awsWest");
        assert_eq!(pascal_case("s3_bucket"), "S3Bucket");
        assert_eq!(snake_case("mostRecent"), "most_recent");
        assert_eq!(snake_case("vpc-id"), "vpc_id");
        assert_eq!(snake_case("already_snake"), "already_snake");
        assert_eq!(snake_case("getAmi"), "get_ami");
    }

    #[test]
    fn test_cv016_identifier_check() {
        assert!(is_identifier("mostRecent"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("content-type"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_cv016_resource_class_derived() {
        let name = resource_class("aws_s3_bucket", None).unwrap();
        assert_eq!(name.qualified(), "s3.Bucket");
        let name = resource_class("aws_s3_bucket_policy", None).unwrap();
        assert_eq!(name.qualified(), "s3.BucketPolicy");
        let name = resource_class("random_id", None).unwrap();
        assert_eq!(name.qualified(), "Id");
        assert!(resource_class("aws_", None).is_none());
        assert!(resource_class("aws", None).is_none());
    }

    #[test]
    fn test_cv016_resource_class_from_token() {
        let name = resource_class("aws_s3_bucket", Some("aws:s3/bucket:Bucket")).unwrap();
        assert_eq!(name.qualified(), "s3.Bucket");
        let name = resource_class("random_id", Some("random:index/randomId:RandomId")).unwrap();
        assert_eq!(name.qualified(), "RandomId");
        // Malformed tokens fall back to the derived name.
        let name = resource_class("aws_vpc", Some("garbage")).unwrap();
        assert_eq!(name.qualified(), "Vpc");
    }

    #[test]
    fn test_cv016_data_function() {
        assert_eq!(data_function("aws_ami", None).unwrap().qualified(), "getAmi");
        assert_eq!(
            data_function("aws_s3_bucket", None).unwrap().qualified(),
            "s3.getBucket"
        );
        assert_eq!(
            data_function("aws_ami", Some("aws:ec2/getAmi:getAmi")).unwrap().qualified(),
            "ec2.getAmi"
        );
    }

    #[test]
    fn test_cv016_names_unique() {
        let mut names = Names::new(["config"]);
        assert_eq!(names.assign(NodeKey::Local("config".into()), "config"), "config2");
        assert_eq!(names.assign(NodeKey::Local("a".into()), "logs"), "logs");
        assert_eq!(names.assign(NodeKey::Resource("x.logs".into()), "logs"), "logs2");
        assert_eq!(names.assign(NodeKey::Local("a".into()), "other"), "logs");
        assert_eq!(names.get(&NodeKey::Resource("x.logs".into())), Some("logs2"));
        assert_eq!(names.get(&NodeKey::Output("none".into())), None);
    }
}
