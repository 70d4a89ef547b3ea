use std::io::{self, Cursor, Read};
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};

use sortly_parser::app::{App, RowIssueKind};
use sortly_parser::config::ParserConfig;
use sortly_parser::domain::NameResolution;
use sortly_parser::error::SortlyError;
use sortly_parser::fetch::{MediaBody, MediaFetcher};
use sortly_parser::grid::{MemoryGrid, SpreadsheetSink, SpreadsheetSource, Workbook};
use sortly_parser::naming::{NamingScheme, SlotNamer};
use sortly_parser::progress::SilentProgress;

const LINKS: &str = "https://cdn.example/photos";

#[derive(Default, Clone)]
struct MockFetcher {
    calls: Arc<Mutex<Vec<String>>>,
    missing: Vec<String>,
    truncated: Vec<String>,
}

impl MockFetcher {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

struct BrokenReader {
    sent: bool,
}

impl Read for BrokenReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.sent {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        }
        self.sent = true;
        buf[0] = b'x';
        Ok(1)
    }
}

impl MediaFetcher for MockFetcher {
    fn open(&self, url: &str) -> Result<MediaBody, SortlyError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.missing.iter().any(|value| value == url) {
            return Err(SortlyError::DownloadStatus {
                status: 404,
                url: url.to_string(),
            });
        }
        if self.truncated.iter().any(|value| value == url) {
            return Ok(MediaBody {
                content_length: Some(1024),
                reader: Box::new(BrokenReader { sent: false }),
            });
        }
        let bytes = format!("jpeg:{url}").into_bytes();
        Ok(MediaBody {
            content_length: Some(bytes.len() as u64),
            reader: Box::new(Cursor::new(bytes)),
        })
    }
}

fn entry(name: &str, kind: &str, ancestors: &[&str], urls: &[&str]) -> Vec<String> {
    let mut cells = vec![String::new(); 12];
    cells[0] = name.to_string();
    cells[1] = kind.to_string();
    for (index, ancestor) in ancestors.iter().enumerate() {
        cells[4 + index] = ancestor.to_string();
    }
    for (index, url) in urls.iter().enumerate() {
        cells[9 + index] = url.to_string();
    }
    cells
}

fn grid(rows: &[Vec<String>]) -> MemoryGrid {
    let mut grid = MemoryGrid::new();
    for (offset, row) in rows.iter().enumerate() {
        for (column, value) in row.iter().enumerate() {
            if !value.is_empty() {
                grid.set_cell(column as u32 + 1, offset as u32 + 2, value);
            }
        }
    }
    grid
}

fn write_export(path: &Utf8Path, rows: &[Vec<String>]) {
    let mut workbook = Workbook::from_spreadsheet(umya_spreadsheet::new_file());
    for (column, header) in ["Entry Name", "Entry Type", "Quantity", "Price", "Folder"]
        .iter()
        .enumerate()
    {
        workbook.set_cell(column as u32 + 1, 1, header);
    }
    for (offset, row) in rows.iter().enumerate() {
        for (column, value) in row.iter().enumerate() {
            if !value.is_empty() {
                workbook.set_cell(column as u32 + 1, offset as u32 + 2, value);
            }
        }
    }
    workbook.save(path).unwrap();
}

fn sandbox() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("storage")).unwrap();
    std::fs::create_dir_all(root.as_std_path()).unwrap();
    (temp, root)
}

fn inventory_rows() -> Vec<Vec<String>> {
    vec![
        entry("Inventory", "Folder", &[], &["http://x/1.jpg"]),
        entry(
            "Widget",
            "Item",
            &["Inventory"],
            &["http://x/2.jpg", "http://x/3.jpg"],
        ),
    ]
}

#[test]
fn end_to_end_inventory_scenario() {
    let (temp, root) = sandbox();
    let input = Utf8PathBuf::from_path_buf(temp.path().join("export.xlsx")).unwrap();
    write_export(&input, &inventory_rows());

    let fetcher = MockFetcher::default();
    let app = App::new(fetcher.clone());
    let config = ParserConfig::new(root.clone(), LINKS).with_file(input);
    let report = app.run(&config, &SilentProgress).unwrap();

    assert_eq!(report.folders, 1);
    assert_eq!(report.items, 1);
    assert_eq!(report.total_images, 3);
    assert_eq!(report.downloaded, 3);
    assert_eq!(report.failed, 0);

    let output = root.join("excel").join("Inventory.xlsx");
    assert_eq!(report.output_path.as_deref(), Some(output.as_str()));
    assert!(output.as_std_path().is_file());

    let folder_namer = SlotNamer::new(NamingScheme::UrlDigest, "Inventory");
    let widget_namer = SlotNamer::new(NamingScheme::UrlDigest, "Widget");
    let folder_photo = folder_namer.file_name(1, "http://x/1.jpg");
    let widget_first = widget_namer.file_name(1, "http://x/2.jpg");
    let widget_second = widget_namer.file_name(2, "http://x/3.jpg");
    for name in [&folder_photo, &widget_first, &widget_second] {
        assert!(root.join("Inventory").join(name).as_std_path().is_file());
    }
    let content = std::fs::read_to_string(root.join("Inventory").join(&widget_second)).unwrap();
    assert_eq!(content, "jpeg:http://x/3.jpg");

    let rewritten = Workbook::open(&output).unwrap();
    assert_eq!(
        rewritten.cell(10, 2).unwrap(),
        format!("{LINKS}/Inventory/{folder_photo}")
    );
    assert_eq!(
        rewritten.cell(10, 3).unwrap(),
        format!("{LINKS}/Inventory/{widget_first}")
    );
    assert_eq!(
        rewritten.cell(11, 3).unwrap(),
        format!("{LINKS}/Inventory/{widget_second}")
    );
    assert_eq!(rewritten.cell(1, 3).unwrap(), "Widget");
}

#[test]
fn rerun_skips_existing_files() {
    let (temp, root) = sandbox();
    let input = Utf8PathBuf::from_path_buf(temp.path().join("export.xlsx")).unwrap();
    write_export(&input, &inventory_rows());

    let fetcher = MockFetcher::default();
    let app = App::new(fetcher.clone());
    let config = ParserConfig::new(root, LINKS).with_file(input);

    app.run(&config, &SilentProgress).unwrap();
    let second = app.run(&config, &SilentProgress).unwrap();

    assert_eq!(second.downloaded, 0);
    assert_eq!(second.already_present, 3);
    assert_eq!(fetcher.calls().len(), 3);
}

#[test]
fn time_seeded_names_keep_the_layout() {
    let (_temp, root) = sandbox();
    let mut grid = grid(&inventory_rows());
    let mut config = ParserConfig::new(root.clone(), LINKS);
    config.naming = NamingScheme::TimeSeeded;

    let report = App::new(MockFetcher::default())
        .process(&mut grid, &config, &SilentProgress)
        .unwrap();
    assert_eq!(report.downloaded, 3);

    let mut names: Vec<String> = std::fs::read_dir(root.join("Inventory").as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names.len(), 3);
    assert!(names[0].starts_with("Inventory photo(1)"));
    assert!(names[1].starts_with("Widget photo(1)"));
    assert!(names[2].starts_with("Widget photo(2)"));
    // one digest per entry
    assert_eq!(names[1]["Widget photo(1)".len()..], names[2]["Widget photo(2)".len()..]);
}

#[test]
fn failed_slots_keep_their_cells() {
    let (_temp, root) = sandbox();
    let mut grid = grid(&inventory_rows());
    let fetcher = MockFetcher {
        missing: vec!["http://x/2.jpg".to_string()],
        truncated: vec!["http://x/3.jpg".to_string()],
        ..MockFetcher::default()
    };
    let config = ParserConfig::new(root.clone(), LINKS);

    let report = App::new(fetcher)
        .process(&mut grid, &config, &SilentProgress)
        .unwrap();

    assert_eq!(report.downloaded, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].column, 10);
    assert_eq!(report.failures[1].column, 11);
    assert_eq!(grid.get(10, 3), Some("http://x/2.jpg"));
    assert_eq!(grid.get(11, 3), Some("http://x/3.jpg"));
    assert!(grid.get(10, 2).unwrap().starts_with(LINKS));

    let truncated =
        SlotNamer::new(NamingScheme::UrlDigest, "Widget").file_name(2, "http://x/3.jpg");
    assert!(!root.join("Inventory").join(truncated).as_std_path().exists());
}

#[test]
fn sibling_folders_are_visited_in_row_order() {
    let (_temp, root) = sandbox();
    let rows = vec![
        entry("A", "Folder", &[], &[]),
        entry("a1", "Item", &["A"], &["http://x/a1.jpg"]),
        entry("A-sub", "Folder", &["A"], &["http://x/asub.jpg"]),
        entry("a2", "Item", &["A", "A-sub"], &["http://x/a2.jpg"]),
        entry("B", "Folder", &[], &["http://x/b.jpg"]),
        entry("b1", "Item", &["B"], &["http://x/b1.jpg"]),
        entry("b2", "Item", &["B"], &["http://x/b2.jpg"]),
        entry("b3", "Item", &["B"], &["http://x/b3.jpg"]),
    ];
    let mut grid = grid(&rows);
    let fetcher = MockFetcher::default();

    App::new(fetcher.clone())
        .process(&mut grid, &ParserConfig::new(root.clone(), LINKS), &SilentProgress)
        .unwrap();

    assert_eq!(
        fetcher.calls(),
        vec![
            "http://x/a1.jpg",
            "http://x/asub.jpg",
            "http://x/a2.jpg",
            "http://x/b.jpg",
            "http://x/b1.jpg",
            "http://x/b2.jpg",
            "http://x/b3.jpg",
        ]
    );
    assert!(root.join("A/A-sub").as_std_path().is_dir());
}

#[test]
fn dangling_ancestor_is_reported_once() {
    let (_temp, root) = sandbox();
    let rows = vec![
        entry("Inventory", "Folder", &[], &[]),
        entry("Ghost", "Item", &["Attic"], &["http://x/ghost.jpg"]),
        entry("Widget", "Item", &["Inventory"], &["http://x/2.jpg"]),
    ];
    let mut grid = grid(&rows);
    let fetcher = MockFetcher::default();

    let report = App::new(fetcher.clone())
        .process(&mut grid, &ParserConfig::new(root, LINKS), &SilentProgress)
        .unwrap();

    assert_eq!(report.dangling_ancestors, 1);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].row, 3);
    assert_eq!(report.issues[0].kind, RowIssueKind::DanglingAncestor);
    assert_eq!(report.items, 1);
    assert_eq!(fetcher.calls(), vec!["http://x/2.jpg"]);
    assert_eq!(grid.get(10, 3), Some("http://x/ghost.jpg"));
}

#[test]
fn unique_names_policy_reports_collisions() {
    let (_temp, root) = sandbox();
    let rows = vec![
        entry("A", "Folder", &[], &[]),
        entry("Box", "Folder", &["A"], &[]),
        entry("B", "Folder", &[], &[]),
        entry("Box", "Folder", &["B"], &[]),
    ];
    let mut grid = grid(&rows);
    let mut config = ParserConfig::new(root, LINKS);
    config.resolution = NameResolution::UniqueNames;

    let report = App::new(MockFetcher::default())
        .process(&mut grid, &config, &SilentProgress)
        .unwrap();
    assert_eq!(report.folders, 3);
    assert_eq!(report.issues[0].kind, RowIssueKind::DuplicateFolderName);
}

#[test]
fn entry_names_cannot_leave_the_root_folder() {
    let (temp, root) = sandbox();
    let outside = format!("{}/outside", temp.path().display());
    let rows = vec![
        entry(&outside, "Folder", &[], &["http://x/abs.jpg"]),
        entry("../escape", "Folder", &[], &["http://x/up.jpg"]),
        entry("Inventory", "Folder", &[], &[]),
        entry("../../Widget", "Item", &["Inventory"], &["http://x/sneaky.jpg"]),
        entry("Widget", "Item", &["Inventory"], &["http://x/widget.jpg"]),
    ];
    let mut grid = grid(&rows);
    let fetcher = MockFetcher::default();

    let report = App::new(fetcher.clone())
        .process(&mut grid, &ParserConfig::new(root.clone(), LINKS), &SilentProgress)
        .unwrap();

    let unsafe_rows: Vec<u32> = report
        .issues
        .iter()
        .filter(|issue| issue.kind == RowIssueKind::UnsafeName)
        .map(|issue| issue.row)
        .collect();
    assert_eq!(unsafe_rows, vec![2, 3, 5]);
    assert_eq!(report.folders, 1);
    assert_eq!(report.downloaded, 1);
    assert_eq!(fetcher.calls(), vec!["http://x/widget.jpg"]);
    assert_eq!(grid.get(10, 2), Some("http://x/abs.jpg"));

    let top_level: Vec<String> = std::fs::read_dir(temp.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(top_level, vec!["storage"]);
}

#[test]
fn unwritable_folder_fails_its_slots_and_the_run_continues() {
    let (_temp, root) = sandbox();
    std::fs::write(root.join("Inventory").as_std_path(), b"not a directory").unwrap();
    let mut rows = inventory_rows();
    rows.push(entry("Garage", "Folder", &[], &["http://x/garage.jpg"]));
    let mut grid = grid(&rows);
    let fetcher = MockFetcher::default();

    let report = App::new(fetcher.clone())
        .process(&mut grid, &ParserConfig::new(root.clone(), LINKS), &SilentProgress)
        .unwrap();

    assert_eq!(report.failed, 3);
    assert_eq!(report.downloaded, 1);
    assert!(
        report
            .failures
            .iter()
            .all(|failure| failure.reason.starts_with("storage unavailable"))
    );
    assert_eq!(fetcher.calls(), vec!["http://x/garage.jpg"]);
    assert_eq!(grid.get(10, 2), Some("http://x/1.jpg"));
    assert!(grid.get(10, 4).unwrap().starts_with(LINKS));
    assert!(root.join("Garage").as_std_path().is_dir());
}

#[test]
fn persist_failure_is_fatal_and_leaves_no_partial_output() {
    let (temp, root) = sandbox();
    let input = Utf8PathBuf::from_path_buf(temp.path().join("export.xlsx")).unwrap();
    write_export(&input, &inventory_rows());
    let config = ParserConfig::new(root.clone(), LINKS).with_file(input);

    // The target name is taken by a directory, so the final rename fails.
    let excel = root.join("excel");
    std::fs::create_dir_all(excel.join("Inventory.xlsx").as_std_path()).unwrap();
    let err = App::new(MockFetcher::default())
        .run(&config, &SilentProgress)
        .unwrap_err();
    assert!(matches!(err, SortlyError::PersistFailure { .. }));
    let leftovers: Vec<String> = std::fs::read_dir(excel.as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["Inventory.xlsx"]);
    assert!(excel.join("Inventory.xlsx").as_std_path().is_dir());

    std::fs::remove_dir_all(excel.as_std_path()).unwrap();
    std::fs::write(excel.as_std_path(), b"not a directory").unwrap();
    let err = App::new(MockFetcher::default())
        .run(&config, &SilentProgress)
        .unwrap_err();
    assert!(matches!(err, SortlyError::PersistFailure { .. }));
    assert!(excel.as_std_path().is_file());
}

#[test]
fn empty_first_row_produces_nothing() {
    let (temp, root) = sandbox();
    let input = Utf8PathBuf::from_path_buf(temp.path().join("export.xlsx")).unwrap();
    write_export(
        &input,
        &[
            entry("", "", &[], &[]),
            entry("Inventory", "Folder", &[], &["http://x/1.jpg"]),
        ],
    );

    let fetcher = MockFetcher::default();
    let config = ParserConfig::new(root.clone(), LINKS).with_file(input);
    let report = App::new(fetcher.clone())
        .run(&config, &SilentProgress)
        .unwrap();

    assert_eq!(report.folders, 0);
    assert_eq!(report.items, 0);
    assert_eq!(report.total_images, 0);
    assert_eq!(report.downloaded + report.already_present + report.failed, 0);
    assert!(report.issues.is_empty());
    assert!(report.output_path.is_none());
    assert!(fetcher.calls().is_empty());
    assert!(!root.join("excel").as_std_path().exists());
}

#[test]
fn missing_input_is_fatal() {
    let (temp, root) = sandbox();
    let input = Utf8PathBuf::from_path_buf(temp.path().join("absent.xlsx")).unwrap();
    let config = ParserConfig::new(root, LINKS).with_file(input);
    let err = App::new(MockFetcher::default())
        .run(&config, &SilentProgress)
        .unwrap_err();
    assert!(matches!(err, SortlyError::InputOpen { .. }));
}
