// src/packaging/mod.rs

//! File layout for component installation
//!
//! Resolves a component's `installation` spec into concrete copy operations
//! against the package directory and lays the files down. With no explicit
//! `packaging` section the whole `files/` payload tree is packed; an explicit
//! but empty section packs nothing. Every laid-down destination path is
//! returned so the caller can record the installed-files manifest used at
//! uninstall time.

use crate::component::definition::{FileSelection, InstallationSpec, FILES_DIR};
use crate::error::{Error, Result};
use crate::template;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Compiled include/exclude filter for one file selection
struct SelectionFilter {
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
}

impl SelectionFilter {
    fn new(selection: &FileSelection) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<glob::Pattern>> {
            patterns
                .iter()
                .map(|p| {
                    glob::Pattern::new(p).map_err(|e| {
                        Error::Validation(format!("invalid file pattern '{}': {}", p, e))
                    })
                })
                .collect()
        };
        Ok(Self {
            include: compile(&selection.include)?,
            exclude: compile(&selection.exclude)?,
        })
    }

    fn matches(patterns: &[glob::Pattern], rel: &str) -> bool {
        let basename = rel.rsplit('/').next().unwrap_or(rel);
        patterns.iter().any(|p| p.matches(rel) || p.matches(basename))
    }

    fn excluded(&self, rel: &str) -> bool {
        Self::matches(&self.exclude, rel)
    }

    /// Whether a regular file survives the include filter
    fn file_selected(&self, rel: &str) -> bool {
        self.include.is_empty() || Self::matches(&self.include, rel)
    }

    /// Empty-include selections copy the directory skeleton too
    fn copy_directories(&self) -> bool {
        self.include.is_empty()
    }
}

/// Lay down a component's files
///
/// `install_root` is the installation prefix; `installdir` the component's
/// directory under it; `attributes` backs `{{...}}` expansion in destination
/// overrides. Returns every destination path created, directories first.
pub fn install_files(
    pkg_dir: &Path,
    spec: Option<&InstallationSpec>,
    install_root: &Path,
    installdir: &Path,
    attributes: &BTreeMap<String, Value>,
) -> Result<Vec<PathBuf>> {
    let dest_base = match spec.and_then(|s| s.prefix.as_deref()) {
        Some(prefix) => install_root.join(prefix),
        None => installdir.to_path_buf(),
    };

    let mut laid = Vec::new();

    match spec.and_then(|s| s.packaging.as_ref()) {
        None => {
            // No packaging section: pack the whole files/ tree if present
            let files_dir = pkg_dir.join(FILES_DIR);
            if files_dir.is_dir() {
                copy_tree(&files_dir, &dest_base, None, &mut laid)?;
            }
        }
        Some(packaging) => {
            for component in &packaging.components {
                if !component.selected {
                    debug!("skipping deselected packaging component '{}'", component.name);
                    continue;
                }
                let component_dest =
                    resolve_destination(component.destination.as_deref(), &dest_base, attributes);
                for folder in &component.folders {
                    let folder_dest = resolve_destination(
                        folder.destination.as_deref(),
                        &component_dest,
                        attributes,
                    );
                    for selection in &folder.files {
                        let permissions = selection
                            .permissions
                            .as_deref()
                            .or(folder.permissions.as_deref())
                            .or(component.permissions.as_deref());
                        install_selection(
                            pkg_dir,
                            selection,
                            &folder_dest,
                            permissions,
                            &mut laid,
                        )?;
                    }
                }
            }
        }
    }

    info!(
        "laid down {} paths under {}",
        laid.len(),
        dest_base.display()
    );
    Ok(laid)
}

/// A destination override may be absolute, relative (to `base`), or a
/// `{{...}}` template expanding to either
fn resolve_destination(
    destination: Option<&str>,
    base: &Path,
    attributes: &BTreeMap<String, Value>,
) -> PathBuf {
    match destination {
        None => base.to_path_buf(),
        Some(raw) => {
            let expanded = template::expand(raw, attributes);
            let path = Path::new(&expanded);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(path)
            }
        }
    }
}

fn install_selection(
    pkg_dir: &Path,
    selection: &FileSelection,
    dest: &Path,
    permissions: Option<&str>,
    laid: &mut Vec<PathBuf>,
) -> Result<()> {
    let filter = SelectionFilter::new(selection)?;
    let mode = parse_permissions(permissions)?;

    let mut matches = Vec::new();
    for origin in &selection.origin {
        let pattern = pkg_dir.join(origin);
        let pattern_str = pattern.to_string_lossy();
        for entry in glob::glob(&pattern_str)
            .map_err(|e| Error::Validation(format!("invalid origin pattern '{}': {}", origin, e)))?
        {
            match entry {
                Ok(path) => matches.push(path),
                Err(e) => {
                    return Err(Error::Io(e.into_error()));
                }
            }
        }
    }

    if matches.is_empty() {
        if selection.allow_empty_list {
            fs::create_dir_all(dest)?;
            return Ok(());
        }
        return Err(Error::Validation(format!(
            "the file selection [{}] resolved to an empty list of files",
            selection.origin.join(", ")
        )));
    }

    fs::create_dir_all(dest)?;
    for matched in matches {
        if matched.is_dir() {
            let target = dest.join(file_name_of(&matched)?);
            copy_filtered_tree(&matched, &target, &filter, mode, laid)?;
        } else {
            let rel = file_name_of(&matched)?;
            if filter.excluded(&rel) || !filter.file_selected(&rel) {
                continue;
            }
            copy_file(&matched, &dest.join(&rel), mode, laid)?;
        }
    }
    Ok(())
}

/// Copy a directory subtree applying include/exclude filtering
fn copy_filtered_tree(
    src: &Path,
    dest: &Path,
    filter: &SelectionFilter,
    mode: Option<u32>,
    laid: &mut Vec<PathBuf>,
) -> Result<()> {
    let root_name = file_name_of(src)?;
    let mut it = WalkDir::new(src).min_depth(0).into_iter();
    while let Some(entry) = it.next() {
        let entry = entry.map_err(|e| Error::Execution(format!("cannot walk '{}': {}", src.display(), e)))?;
        let rel_inside = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Execution(format!("path outside tree: {}", e)))?;
        let rel = if rel_inside.as_os_str().is_empty() {
            root_name.clone()
        } else {
            format!("{}/{}", root_name, rel_inside.to_string_lossy())
        };

        if filter.excluded(&rel) {
            if entry.file_type().is_dir() {
                it.skip_current_dir();
            }
            continue;
        }

        let target = match rel_inside.as_os_str().is_empty() {
            true => dest.to_path_buf(),
            false => dest.join(rel_inside),
        };
        if entry.file_type().is_dir() {
            if filter.copy_directories() {
                create_dir(&target, mode, laid)?;
            }
        } else if filter.file_selected(&rel) {
            if let Some(parent) = target.parent()
                && !parent.exists()
            {
                create_parents(dest, parent, laid)?;
            }
            copy_file(entry.path(), &target, mode, laid)?;
        }
    }
    Ok(())
}

/// Copy a whole tree with no filtering (the default `files/` behavior)
fn copy_tree(
    src: &Path,
    dest: &Path,
    mode: Option<u32>,
    laid: &mut Vec<PathBuf>,
) -> Result<()> {
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| Error::Execution(format!("cannot walk '{}': {}", src.display(), e)))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Execution(format!("path outside tree: {}", e)))?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            create_dir(&target, mode, laid)?;
        } else {
            if let Some(parent) = target.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent)?;
            }
            copy_file(entry.path(), &target, mode, laid)?;
        }
    }
    Ok(())
}

fn create_dir(path: &Path, mode: Option<u32>, laid: &mut Vec<PathBuf>) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        laid.push(path.to_path_buf());
    }
    apply_mode(path, mode)?;
    Ok(())
}

/// Record intermediate directories materialized for a nested kept file
fn create_parents(dest_root: &Path, parent: &Path, laid: &mut Vec<PathBuf>) -> Result<()> {
    let mut missing = Vec::new();
    let mut cursor = parent.to_path_buf();
    while cursor.starts_with(dest_root) && !cursor.exists() {
        missing.push(cursor.clone());
        match cursor.parent() {
            Some(p) => cursor = p.to_path_buf(),
            None => break,
        }
    }
    fs::create_dir_all(parent)?;
    for dir in missing.into_iter().rev() {
        laid.push(dir);
    }
    Ok(())
}

fn copy_file(src: &Path, dest: &Path, mode: Option<u32>, laid: &mut Vec<PathBuf>) -> Result<()> {
    fs::copy(src, dest)?;
    apply_mode(dest, mode)?;
    laid.push(dest.to_path_buf());
    Ok(())
}

fn apply_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    if let Some(mode) = mode {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(mode);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

fn parse_permissions(permissions: Option<&str>) -> Result<Option<u32>> {
    match permissions {
        None => Ok(None),
        Some(text) => u32::from_str_radix(text, 8).map(Some).map_err(|_| {
            Error::Validation(format!("invalid permissions '{}': expected octal digits", text))
        }),
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Validation(format!("path '{}' has no file name", path.display())))
}
