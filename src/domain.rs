use std::fmt;
use std::str::FromStr;

use camino::{Utf8Component, Utf8Path};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SortlyError;

/// First data row; row 1 carries the export's headers.
pub const FIRST_DATA_ROW: u32 = 2;
pub const NAME_COLUMN: u32 = 1;
pub const KIND_COLUMN: u32 = 2;
/// Ancestor folder names, outermost first.
pub const ANCESTOR_COLUMNS: std::ops::RangeInclusive<u32> = 5..=9;
pub const PHOTO_COLUMNS: std::ops::RangeInclusive<u32> = 10..=12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Folder,
    Item,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Folder => write!(f, "Folder"),
            EntryKind::Item => write!(f, "Item"),
        }
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Folder" => Ok(EntryKind::Folder),
            "Item" => Ok(EntryKind::Item),
            other => Err(format!("unknown entry kind \"{other}\"")),
        }
    }
}

/// How ancestor names are matched against folders that already exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NameResolution {
    /// Pre-order search over the whole forest, first folder with the name wins.
    #[default]
    FirstMatch,
    /// Same search, but a folder may not reuse a name that exists anywhere already.
    UniqueNames,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub entry_name: String,
    pub entry_kind: EntryKind,
    pub ancestor_path: Vec<String>,
    pub photo_urls: Vec<String>,
    pub row_index: u32,
}

/// Whether `name` is a single plain path segment, so joining it under the root folder
/// cannot leave the root.
pub fn is_safe_segment(name: &str) -> bool {
    let mut components = Utf8Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Utf8Component::Normal(part)), None) if part == name
    );
    single && !name.contains(['\\', '\0'])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub photo_urls: Vec<String>,
    pub source_row: u32,
}

impl Item {
    pub fn from_row(row: &Row) -> Self {
        Self {
            name: row.entry_name.clone(),
            photo_urls: row.photo_urls.clone(),
            source_row: row.row_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FolderId(usize);

impl FolderId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    pub self_item: Option<Item>,
    pub path: String,
    pub parent: Option<FolderId>,
    pub children: Vec<FolderId>,
    pub items: Vec<Item>,
}

/// Arena of folders; ids stay valid for the lifetime of the forest.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    folders: Vec<Folder>,
    roots: Vec<FolderId>,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, name: &str, self_item: Option<Item>) -> FolderId {
        let id = self.push(Folder {
            name: name.to_string(),
            self_item,
            path: format!("{name}/"),
            parent: None,
            children: Vec::new(),
            items: Vec::new(),
        });
        self.roots.push(id);
        id
    }

    pub fn add_child(&mut self, parent: FolderId, name: &str, self_item: Option<Item>) -> FolderId {
        let path = format!("{}{name}/", self.folders[parent.0].path);
        let id = self.push(Folder {
            name: name.to_string(),
            self_item,
            path,
            parent: Some(parent),
            children: Vec::new(),
            items: Vec::new(),
        });
        self.folders[parent.0].children.push(id);
        id
    }

    pub fn add_item(&mut self, parent: FolderId, item: Item) {
        self.folders[parent.0].items.push(item);
    }

    fn push(&mut self, folder: Folder) -> FolderId {
        let id = FolderId(self.folders.len());
        self.folders.push(folder);
        id
    }

    pub fn folder(&self, id: FolderId) -> &Folder {
        &self.folders[id.0]
    }

    pub fn roots(&self) -> &[FolderId] {
        &self.roots
    }

    pub fn first_root(&self) -> Option<&Folder> {
        self.roots.first().map(|id| self.folder(*id))
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Folders in pre-order: each root, then its children in row order, recursively.
    pub fn preorder(&self) -> Vec<FolderId> {
        let mut order = Vec::with_capacity(self.folders.len());
        let mut stack: Vec<FolderId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.folders[id.0].children.iter().rev().copied());
        }
        order
    }

    pub fn find_by_name(&self, name: &str) -> Option<FolderId> {
        self.preorder()
            .into_iter()
            .find(|id| self.folders[id.0].name == name)
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn item_count(&self) -> usize {
        self.folders.iter().map(|folder| folder.items.len()).sum()
    }

    pub fn image_count(&self) -> usize {
        self.folders
            .iter()
            .map(|folder| {
                let own = folder
                    .self_item
                    .as_ref()
                    .map(|item| item.photo_urls.len())
                    .unwrap_or(0);
                own + folder
                    .items
                    .iter()
                    .map(|item| item.photo_urls.len())
                    .sum::<usize>()
            })
            .sum()
    }
}

/// 1-based sheet coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellCoordinate {
    pub column: u32,
    pub row: u32,
}

impl CellCoordinate {
    pub fn photo_slot(slot: usize, row: u32) -> Self {
        Self {
            column: *PHOTO_COLUMNS.start() + slot as u32 - 1,
            row,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Downloaded,
    AlreadyPresent,
    Failed,
}

impl SlotStatus {
    pub fn is_materialized(self) -> bool {
        matches!(self, SlotStatus::Downloaded | SlotStatus::AlreadyPresent)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterializationOutcome {
    pub cell: CellCoordinate,
    pub url: String,
    pub local_path: String,
    pub public_link: String,
    pub status: SlotStatus,
    pub failure: Option<String>,
}
