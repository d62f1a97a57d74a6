use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

/// Parsed `scene.xml` bundle manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SceneManifest {
    pub entries: Vec<SceneEntry>,
    /// Equirectangular environment texture, passed through to the host
    /// renderer as opaque cargo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

/// Which interaction group an entry is inserted into once loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Eligible for ray-grab, member of the interactable group.
    Grab,
    /// Teleport destination surface, member of the teleport group.
    Floor,
    /// Plain scenery under the scene root.
    Prop,
}

impl ObjectKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "grab" => Some(Self::Grab),
            "floor" => Some(Self::Floor),
            "prop" => Some(Self::Prop),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grab => "grab",
            Self::Floor => "floor",
            Self::Prop => "prop",
        }
    }
}

/// One placed object from the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEntry {
    pub name: String,
    pub kind: ObjectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<String>,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
    #[serde(default = "default_color")]
    pub color: Vec3,
}

impl Default for SceneEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: ObjectKind::Prop,
            mesh: None,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: default_scale(),
            color: default_color(),
        }
    }
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

fn default_color() -> Vec3 {
    Vec3::ONE
}

impl SceneManifest {
    /// Parses the manifest XML produced by the authoring tools.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let environment = document
            .descendants()
            .find(|n| n.has_tag_name("environment"))
            .and_then(|n| n.text())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);

        let mut entries = Vec::new();
        for node in document.descendants().filter(|n| n.has_tag_name("object")) {
            let mut entry = SceneEntry::default();
            entry.name = required_text(&node, "name")?;
            entry.kind = match optional_text(&node, "kind") {
                Some(kind) => ObjectKind::from_name(&kind)
                    .ok_or_else(|| anyhow!("unknown object kind '{kind}'"))?,
                None => ObjectKind::Prop,
            };
            entry.mesh = optional_text(&node, "mesh");
            entry.position = parse_vec3(optional_text(&node, "position"), entry.position)?;
            entry.rotation = parse_vec3(optional_text(&node, "rotation"), entry.rotation)?;
            entry.scale = parse_vec3(optional_text(&node, "scale"), entry.scale)?;
            entry.color = parse_color(optional_text(&node, "color"), entry.color)?;
            entries.push(entry);
        }

        Ok(Self {
            entries,
            environment,
        })
    }

    pub fn entries_of_kind(&self, kind: ObjectKind) -> impl Iterator<Item = &SceneEntry> {
        self.entries.iter().filter(move |entry| entry.kind == kind)
    }
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let mut numbers = value
        .split_whitespace()
        .filter_map(|component| component.parse::<f32>().ok());
    let mut component = || {
        numbers
            .next()
            .ok_or_else(|| anyhow!("vector is missing components"))
    };
    Ok(Vec3::new(component()?, component()?, component()?))
}

fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    Ok(parse_vec3(value, default * 255.0)? / 255.0)
}
