//! Destination paths never leave the download root

use crate::support::resource;
use cloud_asset_mirror::output::{destination_path, PathError};
use std::path::{Component, Path};

const HOSTILE_FOLDERS: &[&str] = &[
    "../x",
    "/etc",
    "\\windows\\system32",
    "C:/temp",
    "a/../../b",
    "a/./../..",
    "..",
    "ok/..\\..",
];

#[test]
fn test_hostile_folders_are_rejected() {
    let root = Path::new("/srv/mirror");
    for folder in HOSTILE_FOLDERS {
        let result = destination_path(root, &resource("file", folder));
        assert!(
            matches!(
                result,
                Err(PathError::Absolute { .. }) | Err(PathError::ParentEscape { .. })
            ),
            "folder {folder:?} produced {result:?}"
        );
    }
}

#[test]
fn test_hostile_ids_are_rejected() {
    let root = Path::new("/srv/mirror");
    for id in ["../../passwd", "/abs", "a/../../b", "nul\0byte", ""] {
        let result = destination_path(root, &resource(id, "safe"));
        assert!(result.is_err(), "id {id:?} produced {result:?}");
    }
}

#[test]
fn test_accepted_paths_stay_under_root() {
    let root = Path::new("/srv/mirror");
    let cases = [
        ("dog", "animals"),
        ("nested/deeper/dog", "animals/pets"),
        ("..hidden", "dots..in..names"),
        ("x", ""),
        ("spaces in name", "with spaces"),
    ];

    for (id, folder) in cases {
        let path = destination_path(root, &resource(id, folder)).unwrap();
        assert!(path.starts_with(root), "{path:?} escaped the root");
        assert!(
            path.components().all(|c| !matches!(c, Component::ParentDir)),
            "{path:?} contains a parent component"
        );
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
    }
}
