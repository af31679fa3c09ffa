//! Pages, page sets and page items.
//!
//! A page item is a handle on its prototype's instance arena plus an
//! instance number. Instance 1 is the prototype. The arena only records
//! how far the instances have been materialized; asking for instance `n`
//! grows it to `n`, never past.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::item_type::ItemType;
use super::mlstring::Mlstring;
use super::EvalError;

/// Question definition shared by every instance of an item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDefinition {
    pub variable: String,
    pub wording: Mlstring,
    pub item_type: ItemType,
    pub array: bool,
    pub section: Option<String>,
}

/// Identity of an item instance inside an interview.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    pub variable: String,
    pub instance: u32,
}

impl ItemKey {
    pub fn new(variable: impl Into<String>, instance: u32) -> Self {
        ItemKey {
            variable: variable.into(),
            instance,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance == 1 {
            f.write_str(&self.variable)
        } else {
            write!(f, "{}#{}", self.variable, self.instance)
        }
    }
}

/// Definition plus the highest instance built so far.
#[derive(Debug)]
struct InstanceArena {
    definition: ItemDefinition,
    built: AtomicU32,
}

/// Handle on one instance of an item.
#[derive(Debug, Clone)]
pub struct PageItem {
    arena: Arc<InstanceArena>,
    instance: u32,
}

impl PageItem {
    pub fn new(definition: ItemDefinition) -> PageItem {
        PageItem {
            arena: Arc::new(InstanceArena {
                definition,
                built: AtomicU32::new(1),
            }),
            instance: 1,
        }
    }

    fn at(&self, instance: u32) -> PageItem {
        self.arena.built.fetch_max(instance, Ordering::AcqRel);
        PageItem {
            arena: Arc::clone(&self.arena),
            instance,
        }
    }

    pub fn definition(&self) -> &ItemDefinition {
        &self.arena.definition
    }

    pub fn variable(&self) -> &str {
        &self.arena.definition.variable
    }

    pub fn item_type(&self) -> &ItemType {
        &self.arena.definition.item_type
    }

    pub fn is_array(&self) -> bool {
        self.arena.definition.array
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }

    pub fn is_prototype(&self) -> bool {
        self.instance == 1
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.variable(), self.instance())
    }

    pub fn prototype_of(&self, other: &PageItem) -> bool {
        Arc::ptr_eq(&self.arena, &other.arena)
    }

    /// Whether the instance after this one has been built yet.
    pub fn has_next_instance(&self) -> bool {
        self.arena.built.load(Ordering::Acquire) > self.instance
    }

    /// Instance 2, built on first call.
    pub fn next_instance(&self) -> Result<PageItem, EvalError> {
        self.require_prototype()?;
        Ok(self.at(2))
    }

    /// Instance `n`, growing the arena up to it.
    pub fn get_instance(&self, n: u32) -> Result<PageItem, EvalError> {
        self.require_prototype()?;
        if n == 0 {
            return Err(EvalError::InvalidInstance {
                variable: self.variable().to_string(),
                instance: n,
            });
        }
        Ok(self.at(n))
    }

    fn require_prototype(&self) -> Result<(), EvalError> {
        if self.is_prototype() {
            Ok(())
        } else {
            Err(EvalError::NotAPrototype {
                variable: self.variable().to_string(),
                instance: self.instance(),
            })
        }
    }
}

impl PartialEq for PageItem {
    fn eq(&self, other: &Self) -> bool {
        self.prototype_of(other) && self.instance() == other.instance()
    }
}

impl Eq for PageItem {}

// ──────────────────────────────────────────────
// Pages
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Page {
    pub id: String,
    pub name: Mlstring,
    /// Prototypes, in page order.
    pub items: Vec<PageItem>,
}

/// A group of pages filled in as one interview.
#[derive(Debug, Clone)]
pub struct PageSet {
    pub type_name: String,
    pub label: Mlstring,
    pub pages: Vec<Arc<Page>>,
}

impl PageSet {
    /// Prototypes of every page, first occurrence only.
    pub fn items(&self) -> Vec<PageItem> {
        let mut out: Vec<PageItem> = Vec::new();
        for page in &self.pages {
            for item in &page.items {
                if !out.iter().any(|seen| seen == item) {
                    out.push(item.clone());
                }
            }
        }
        out
    }

    pub fn declares(&self, variable: &str) -> bool {
        self.pages
            .iter()
            .any(|p| p.items.iter().any(|i| i.variable() == variable))
    }
}
