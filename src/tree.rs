use crate::domain::{EntryKind, FolderId, Forest, Item, NameResolution, Row, is_safe_segment};
use crate::error::SortlyError;

/// Where an attached row ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attached {
    Root(FolderId),
    Folder(FolderId),
    Item { parent: FolderId },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TreeBuilder {
    resolution: NameResolution,
}

impl TreeBuilder {
    pub fn new(resolution: NameResolution) -> Self {
        Self { resolution }
    }

    /// Attaches one row. On error the forest is left unchanged.
    pub fn attach(&self, forest: &mut Forest, row: &Row) -> Result<Attached, SortlyError> {
        // Names become directory and file names under the root folder.
        if !is_safe_segment(&row.entry_name) {
            return Err(SortlyError::UnsafeName {
                row: row.row_index,
                name: row.entry_name.clone(),
            });
        }

        if row.ancestor_path.is_empty() {
            return match row.entry_kind {
                EntryKind::Folder => {
                    self.check_unique(forest, row)?;
                    Ok(Attached::Root(
                        forest.add_root(&row.entry_name, Some(Item::from_row(row))),
                    ))
                }
                EntryKind::Item => Err(SortlyError::TopLevelItem {
                    row: row.row_index,
                    name: row.entry_name.clone(),
                }),
            };
        }

        let parent = self.resolve_parent(forest, row)?;
        match row.entry_kind {
            EntryKind::Folder => {
                self.check_unique(forest, row)?;
                Ok(Attached::Folder(forest.add_child(
                    parent,
                    &row.entry_name,
                    Some(Item::from_row(row)),
                )))
            }
            EntryKind::Item => {
                forest.add_item(parent, Item::from_row(row));
                Ok(Attached::Item { parent })
            }
        }
    }

    // Every ancestor must resolve; the innermost one is the parent.
    fn resolve_parent(&self, forest: &Forest, row: &Row) -> Result<FolderId, SortlyError> {
        let mut parent = None;
        for ancestor in &row.ancestor_path {
            let found =
                forest
                    .find_by_name(ancestor)
                    .ok_or_else(|| SortlyError::DanglingAncestor {
                        row: row.row_index,
                        ancestor: ancestor.clone(),
                    })?;
            parent = Some(found);
        }
        parent.ok_or_else(|| SortlyError::MalformedRow {
            row: row.row_index,
            reason: "empty ancestor path".to_string(),
        })
    }

    fn check_unique(&self, forest: &Forest, row: &Row) -> Result<(), SortlyError> {
        if self.resolution == NameResolution::UniqueNames
            && forest.find_by_name(&row.entry_name).is_some()
        {
            return Err(SortlyError::DuplicateFolderName {
                row: row.row_index,
                name: row.entry_name.clone(),
            });
        }
        Ok(())
    }
}
