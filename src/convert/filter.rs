//! CV-012: Resource name property filter.
//!
//! Drops name properties from managed resources so the target platform can
//! assign names itself. With an explicit property name, exactly that key is
//! dropped. Otherwise every key whose schema default is auto-named goes; the
//! decision looks at keys and schemas only, never at the bound values.

use crate::il::Graph;

/// Filter name properties across the whole forest. An empty `property`
/// selects schema-driven auto-detection. Data sources are left untouched.
pub fn filter_resource_properties(forest: &mut [Graph], property: &str) {
    let auto_names = property.is_empty();
    for graph in forest.iter_mut() {
        for resource in graph.resources.values_mut() {
            if resource.is_data_source {
                continue;
            }
            let schemas = resource.schemas();
            let drop: Vec<String> = resource
                .properties
                .keys()
                .filter(|key| {
                    if auto_names {
                        schemas
                            .property_schemas(key)
                            .and_then(|sch| sch.default.as_ref())
                            .is_some_and(|d| d.auto_named)
                    } else {
                        key.as_str() == property
                    }
                })
                .cloned()
                .collect();
            if drop.is_empty() {
                continue;
            }
            tracing::debug!(resource = %resource.id(), dropped = ?drop, "filtered name properties");
            resource.filter_properties(|key, _| !drop.iter().any(|d| d == key));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{DefaultInfo, PropertySchema, ProviderInfo, ResourceSchema};
    use crate::il::{BoundNode, Location, ProviderRef, ResourceNode};
    use indexmap::IndexMap;
    use std::sync::Arc;

    fn aws_info() -> Arc<ProviderInfo> {
        let mut schema = ResourceSchema::default();
        schema.properties.insert(
            "name".to_string(),
            PropertySchema {
                name: None,
                default: Some(DefaultInfo {
                    value: None,
                    auto_named: true,
                }),
            },
        );
        schema.properties.insert(
            "acl".to_string(),
            PropertySchema {
                name: None,
                default: Some(DefaultInfo {
                    value: Some("private".into()),
                    auto_named: false,
                }),
            },
        );
        schema.properties.insert("tags".to_string(), PropertySchema::default());
        let mut info = ProviderInfo {
            name: "aws".to_string(),
            ..Default::default()
        };
        info.resources.insert("aws_s3_bucket".to_string(), schema.clone());
        info.data_sources.insert("aws_s3_bucket".to_string(), schema);
        Arc::new(info)
    }

    fn bucket(is_data_source: bool, info: Option<Arc<ProviderInfo>>) -> ResourceNode {
        let mut properties = IndexMap::new();
        for key in ["name", "customName", "acl", "tags", "versioning"] {
            properties.insert(key.to_string(), BoundNode::string(format!("{}-value", key)));
        }
        ResourceNode {
            name: "logs".to_string(),
            location: Location::unknown(),
            comments: None,
            kind: "aws_s3_bucket".to_string(),
            provider: ProviderRef::Declared("aws".to_string()),
            properties,
            depends_on: vec![],
            is_data_source,
            provider_info: info,
        }
    }

    fn forest_with(resource: ResourceNode) -> Vec<Graph> {
        let mut graph = Graph::default();
        graph.resources.insert(resource.id(), resource);
        vec![graph]
    }

    fn keys(forest: &[Graph]) -> Vec<String> {
        forest[0].resources[0].properties.keys().cloned().collect()
    }

    #[test]
    fn test_cv012_auto_detect_drops_auto_named() {
        let mut forest = forest_with(bucket(false, Some(aws_info())));
        filter_resource_properties(&mut forest, "");
        assert_eq!(keys(&forest), vec!["customName", "acl", "tags", "versioning"]);
        assert_eq!(
            forest[0].resources[0].properties["acl"],
            BoundNode::string("acl-value")
        );
    }

    #[test]
    fn test_cv012_explicit_key() {
        let mut forest = forest_with(bucket(false, Some(aws_info())));
        filter_resource_properties(&mut forest, "customName");
        assert_eq!(keys(&forest), vec!["name", "acl", "tags", "versioning"]);
    }

    #[test]
    fn test_cv012_no_schema_keeps_everything() {
        let mut forest = forest_with(bucket(false, None));
        filter_resource_properties(&mut forest, "");
        assert_eq!(keys(&forest).len(), 5);
    }

    #[test]
    fn test_cv012_data_sources_untouched() {
        let mut forest = forest_with(bucket(true, Some(aws_info())));
        filter_resource_properties(&mut forest, "");
        filter_resource_properties(&mut forest, "customName");
        assert_eq!(keys(&forest).len(), 5);
    }

    #[test]
    fn test_cv012_explicit_value_with_auto_named_key_is_dropped() {
        let mut resource = bucket(false, Some(aws_info()));
        resource
            .properties
            .insert("name".to_string(), BoundNode::string("explicitly-chosen"));
        let mut forest = forest_with(resource);
        filter_resource_properties(&mut forest, "");
        assert!(!forest[0].resources[0].properties.contains_key("name"));
    }
}
