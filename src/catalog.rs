//! Product catalog: the remote JSON tree of satellites, sensors and product
//! families, reduced to groups and leaves.
//!
//! The remote document is an array of satellites. Every object names itself
//! with its first string field (`sat`, `sen`, `product`, ...), nests further
//! objects in arrays, and lists selectable products in a `prodlist` array of
//! `{"prod": <name>, "pat": <pattern>}` entries.
use crate::error::CatalogError;
use crate::product::ProductDescriptor;
use serde_json::{Map, Value};
use tracing::{debug, info};

pub const PRODUCT_CATALOG_URL: &str = "https://www.mosdac.gov.in/gallery/product.json?v=0.4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogNode {
    Group {
        name: String,
        kind: String,
        children: Vec<CatalogNode>,
    },
    Leaf {
        name: String,
        pattern: String,
    },
}

impl CatalogNode {
    pub fn name(&self) -> &str {
        match self {
            Self::Group { name, .. } | Self::Leaf { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    roots: Vec<CatalogNode>,
}

impl Catalog {
    pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Self, CatalogError> {
        info!("Fetching product catalog from {url}");
        let value: Value = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &Value) -> Result<Self, CatalogError> {
        let satellites = value.as_array().ok_or(CatalogError::NotAnArray)?;
        let roots = satellites
            .iter()
            .filter_map(Value::as_object)
            .flat_map(parse_object)
            .collect::<Vec<_>>();
        debug!("Catalog has {} top level groups", roots.len());
        Ok(Self { roots })
    }

    pub fn roots(&self) -> &[CatalogNode] {
        &self.roots
    }

    /// Every leaf as `(path, pattern)`, depth first, in document order.
    pub fn leaves(&self) -> Vec<(String, &str)> {
        let mut leaves = vec![];
        for root in &self.roots {
            collect_leaves(root, "", &mut leaves);
        }
        leaves
    }

    /// Resolves a `/`-separated path of node names to the product at its end.
    pub fn resolve(&self, path: &str) -> Option<ProductDescriptor> {
        let segments = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>();
        let (last, groups) = segments.split_last()?;

        let mut level = self.roots.as_slice();
        for segment in groups {
            level = level.iter().find_map(|node| match node {
                CatalogNode::Group { name, children, .. } if name == segment => {
                    Some(children.as_slice())
                }
                _ => None,
            })?;
        }

        level.iter().find_map(|node| match node {
            CatalogNode::Leaf { name, pattern } if name == last => {
                Some(ProductDescriptor::from_pattern(pattern, &segments.join("/")).with_name(name))
            }
            _ => None,
        })
    }
}

fn parse_object(object: &Map<String, Value>) -> Vec<CatalogNode> {
    let mut children = vec![];
    for (key, value) in object {
        match value {
            Value::Array(items) if key == "prodlist" => {
                children.extend(items.iter().filter_map(parse_leaf));
            }
            Value::Array(items) => {
                for item in items.iter().filter_map(Value::as_object) {
                    children.extend(parse_object(item));
                }
            }
            Value::Object(inner) => children.extend(parse_object(inner)),
            _ => {}
        }
    }

    // Objects without a naming field splice their children into the parent
    match object.iter().find_map(|(k, v)| v.as_str().map(|s| (k, s))) {
        Some((kind, name)) => vec![CatalogNode::Group {
            name: name.to_string(),
            kind: kind.to_string(),
            children,
        }],
        None => children,
    }
}

fn parse_leaf(item: &Value) -> Option<CatalogNode> {
    Some(CatalogNode::Leaf {
        name: item.get("prod")?.as_str()?.to_string(),
        pattern: item.get("pat")?.as_str()?.to_string(),
    })
}

fn collect_leaves<'a>(node: &'a CatalogNode, prefix: &str, out: &mut Vec<(String, &'a str)>) {
    let path = if prefix.is_empty() {
        node.name().to_string()
    } else {
        format!("{prefix}/{}", node.name())
    };
    match node {
        CatalogNode::Group { children, .. } => {
            for child in children {
                collect_leaves(child, &path, out);
            }
        }
        CatalogNode::Leaf { pattern, .. } => out.push((path, pattern.as_str())),
    }
}
