//! Content Context - Lore
//!
//! 项目范围内的设定库。名称在同类中唯一（大小写不敏感），
//! 只追加，已有条目不会被覆盖。

use serde::{Deserialize, Serialize};

/// 设定库
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Lore {
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub world_elements: Vec<WorldElement>,
}

/// 角色
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub traits: Vec<String>,
    /// 关系（字符串或 `{name, type}` 对象）
    #[serde(default)]
    pub relationships: Vec<serde_json::Value>,
}

/// 地点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub significance: String,
}

/// 世界观元素（科技、魔法、种族、派系、组织等）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldElement {
    pub name: String,
    #[serde(rename = "type", default)]
    pub element_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<String>,
}

/// 单个设定条目
#[derive(Debug, Clone, PartialEq)]
pub enum LoreElement {
    Character(Character),
    Location(Location),
    WorldElement(WorldElement),
}

impl LoreElement {
    pub fn name(&self) -> &str {
        match self {
            LoreElement::Character(c) => &c.name,
            LoreElement::Location(l) => &l.name,
            LoreElement::WorldElement(w) => &w.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LoreElement::Character(_) => "character",
            LoreElement::Location(_) => "location",
            LoreElement::WorldElement(_) => "world_element",
        }
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

impl Lore {
    pub fn is_empty(&self) -> bool {
        self.characters.is_empty() && self.locations.is_empty() && self.world_elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.characters.len() + self.locations.len() + self.world_elements.len()
    }

    /// 同类中是否已存在同名条目（大小写不敏感）
    pub fn contains(&self, element: &LoreElement) -> bool {
        let name = element.name();
        match element {
            LoreElement::Character(_) => self.characters.iter().any(|c| same_name(&c.name, name)),
            LoreElement::Location(_) => self.locations.iter().any(|l| same_name(&l.name, name)),
            LoreElement::WorldElement(_) => {
                self.world_elements.iter().any(|w| same_name(&w.name, name))
            }
        }
    }

    /// 追加条目；同名已存在时跳过，返回是否添加
    pub fn add(&mut self, element: LoreElement) -> bool {
        if element.name().trim().is_empty() || self.contains(&element) {
            return false;
        }
        match element {
            LoreElement::Character(c) => self.characters.push(c),
            LoreElement::Location(l) => self.locations.push(l),
            LoreElement::WorldElement(w) => self.world_elements.push(w),
        }
        true
    }

    /// 批量合并，返回实际新增数量
    pub fn merge(&mut self, elements: impl IntoIterator<Item = LoreElement>) -> usize {
        elements.into_iter().filter(|e| self.add(e.clone())).count()
    }

    /// 按名称列出全部条目（kind, name）
    pub fn names(&self) -> Vec<(&'static str, &str)> {
        self.characters
            .iter()
            .map(|c| ("character", c.name.as_str()))
            .chain(self.locations.iter().map(|l| ("location", l.name.as_str())))
            .chain(
                self.world_elements
                    .iter()
                    .map(|w| ("world_element", w.name.as_str())),
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(name: &str) -> LoreElement {
        LoreElement::Character(Character {
            name: name.to_string(),
            role: "supporting".to_string(),
            description: String::new(),
            traits: Vec::new(),
            relationships: Vec::new(),
        })
    }

    #[test]
    fn test_merge_dedups_case_insensitive() {
        let mut lore = Lore::default();
        assert!(lore.add(character("Mara Voss")));

        let added = lore.merge(vec![character("mara voss"), character("  MARA VOSS "), character("Ilya")]);
        assert_eq!(added, 1);
        assert_eq!(lore.characters.len(), 2);
        // 原条目保持不变
        assert_eq!(lore.characters[0].name, "Mara Voss");
    }

    #[test]
    fn test_same_name_different_kind_allowed() {
        let mut lore = Lore::default();
        lore.add(character("Haven"));
        let added = lore.add(LoreElement::Location(Location {
            name: "Haven".to_string(),
            description: "A port city".to_string(),
            significance: String::new(),
        }));
        assert!(added);
        assert_eq!(lore.len(), 2);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut lore = Lore::default();
        assert!(!lore.add(character("   ")));
        assert!(lore.is_empty());
    }
}
