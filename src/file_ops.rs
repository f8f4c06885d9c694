//! Local filesystem tools.
//!
//! Every path argument goes through [`PathResolver::resolve`] first, so
//! `desktop/notes` and `~/notes` mean the same thing in every tool.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use glob::Pattern;
use serde_json::{Value, json};
use walkdir::WalkDir;

use super::{
    AppendFileArgs, CreateFileArgs, CreateFolderArgs, DeleteFolderArgs, Executor, FilePathArgs,
    FolderPathArgs, ListDirectoryArgs, MoveArgs, Outcome, SearchFilesArgs, ToolContext,
    WriteFileArgs, parse_args, round2,
};

const MAX_SEARCH_RESULTS: usize = 500;
const KB: f64 = 1024.0;

// ── Path resolution ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct PathResolver {
    desktop: PathBuf,
    home: Option<PathBuf>,
    cwd: PathBuf,
}

impl PathResolver {
    pub(crate) fn new(desktop: PathBuf, home: Option<PathBuf>, cwd: PathBuf) -> Self {
        Self { desktop, home, cwd }
    }

    pub(crate) fn from_system(desktop_override: Option<PathBuf>) -> Self {
        let home = dirs::home_dir();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let desktop = desktop_override.unwrap_or_else(|| default_desktop_dir(home.as_deref()));
        Self::new(desktop, home, cwd)
    }

    /// Map a user-facing path to an absolute, lexically normalized one.
    pub(crate) fn resolve(&self, raw: &str) -> PathBuf {
        let raw = raw.trim();
        let raw = if raw.is_empty() { "." } else { raw };
        let lower = raw.to_ascii_lowercase();
        let path = if lower == "desktop" {
            self.desktop.clone()
        } else if lower.starts_with("desktop/") || lower.starts_with("desktop\\") {
            let rest = raw["desktop/".len()..].trim_start_matches(['/', '\\']);
            self.desktop.join(rest)
        } else if raw == "~" {
            self.home.clone().unwrap_or_else(|| PathBuf::from(raw))
        } else if let Some(rest) = raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
            match &self.home {
                Some(home) => home.join(rest),
                None => PathBuf::from(raw),
            }
        } else {
            PathBuf::from(raw)
        };
        let absolute = if path.is_absolute() {
            path
        } else {
            self.cwd.join(path)
        };
        normalize_lexically(&absolute)
    }
}

pub(crate) fn default_desktop_dir(home: Option<&Path>) -> PathBuf {
    if let Some(desktop) = dirs::desktop_dir() {
        return desktop;
    }
    let Some(home) = home else {
        return PathBuf::from("Desktop");
    };
    if cfg!(windows) {
        let onedrive = home.join("OneDrive").join("Desktop");
        if onedrive.is_dir() {
            return onedrive;
        }
    }
    home.join("Desktop")
}

/// Resolve `.` and `..` without touching the filesystem; the target may not exist yet.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

/// A destination naming an existing directory means "inside that directory".
fn destination_for(source: &Path, destination: PathBuf) -> PathBuf {
    if destination.is_dir() {
        if let Some(name) = source.file_name() {
            return destination.join(name);
        }
    }
    destination
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn ensure_parent(path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Error creating directory {}: {e}", display(parent)))?;
    }
    Ok(())
}

fn copy_dir_recursive(source: &Path, destination: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(std::io::Error::other)?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn to_rfc3339(time: std::io::Result<std::time::SystemTime>) -> Value {
    match time {
        Ok(t) => json!(DateTime::<Utc>::from(t).to_rfc3339()),
        Err(_) => Value::Null,
    }
}

// ── Dispatch ────────────────────────────────────────────────────────

pub(crate) fn file_executor(name: &str) -> Option<Executor> {
    let exec: Executor = match name {
        "create_file_tool" => create_file,
        "read_file_tool" => read_file,
        "write_file_tool" => write_file,
        "append_to_file_tool" => append_to_file,
        "delete_file_tool" => delete_file,
        "create_folder_tool" => create_folder,
        "delete_folder_tool" => delete_folder,
        "list_directory_tool" => list_directory,
        "move_file_tool" => move_file,
        "move_folder_tool" => move_folder,
        "search_files_tool" => search_files,
        "copy_file_tool" => copy_file,
        "get_file_info_tool" => get_file_info,
        "get_file_size_tool" => get_file_size,
        "get_folder_size_tool" => get_folder_size,
        _ => return None,
    };
    Some(exec)
}

// ── Files ───────────────────────────────────────────────────────────

fn create_file(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: CreateFileArgs = parse_args(args)?;
    let filename = parsed
        .filename
        .map(|f| f.trim().to_string())
        .unwrap_or_else(|| "new_file.txt".to_string());
    if filename.is_empty() {
        return Ok(Outcome::failure("Filename must not be empty"));
    }
    let dir = ctx.paths.resolve(parsed.path.as_deref().unwrap_or("."));
    let target = normalize_lexically(&dir.join(&filename));
    if target.exists() {
        return Ok(Outcome::failure(format!(
            "File already exists: {}",
            display(&target)
        )));
    }
    ensure_parent(&target)?;
    let content = parsed.content.unwrap_or_default();
    let mut file = match OpenOptions::new().write(true).create_new(true).open(&target) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Ok(Outcome::failure(format!(
                "File already exists: {}",
                display(&target)
            )));
        }
        Err(e) => return Err(format!("Error creating file {}: {e}", display(&target))),
    };
    file.write_all(content.as_bytes())
        .map_err(|e| format!("Error writing file {}: {e}", display(&target)))?;
    Ok(Outcome::ok(json!({
        "message": format!("File '{filename}' created successfully"),
        "path": display(&target),
        "filename": filename,
        "size": content.len(),
    })))
}

fn read_file(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: FilePathArgs = parse_args(args)?;
    let path = ctx.paths.resolve(&parsed.file_path);
    if !path.exists() {
        return Ok(Outcome::failure(format!("File not found: {}", display(&path))));
    }
    if !path.is_file() {
        return Ok(Outcome::failure(format!("Path is not a file: {}", display(&path))));
    }
    let bytes = fs::read(&path).map_err(|e| format!("Error reading file {}: {e}", display(&path)))?;
    match String::from_utf8(bytes) {
        Ok(content) => Ok(Outcome::ok(json!({
            "size": content.len(),
            "content": content,
            "path": display(&path),
            "filename": file_name_of(&path),
        }))),
        Err(_) => Ok(Outcome::failure(format!(
            "File contains binary data or unsupported encoding: {}",
            display(&path)
        ))),
    }
}

fn write_file(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: WriteFileArgs = parse_args(args)?;
    let path = ctx.paths.resolve(&parsed.file_path);
    if path.is_dir() {
        return Ok(Outcome::failure(format!("Path is a directory: {}", display(&path))));
    }
    let overwrite = parsed.overwrite.unwrap_or(false);
    let existed = path.exists();
    if existed && !overwrite {
        return Ok(Outcome::failure(format!(
            "File already exists. Use overwrite=true to replace it: {}",
            display(&path)
        )));
    }
    ensure_parent(&path)?;
    fs::write(&path, parsed.content.as_bytes())
        .map_err(|e| format!("Error writing file {}: {e}", display(&path)))?;
    let verb = if existed { "overwritten" } else { "written" };
    Ok(Outcome::ok(json!({
        "message": format!("File {verb} successfully"),
        "path": display(&path),
        "size": parsed.content.len(),
    })))
}

fn append_to_file(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: AppendFileArgs = parse_args(args)?;
    let path = ctx.paths.resolve(&parsed.file_path);
    if !path.exists() {
        return Ok(Outcome::failure(format!("File not found: {}", display(&path))));
    }
    if !path.is_file() {
        return Ok(Outcome::failure(format!("Path is not a file: {}", display(&path))));
    }
    let mut file = OpenOptions::new()
        .append(true)
        .open(&path)
        .map_err(|e| format!("Error opening file {}: {e}", display(&path)))?;
    file.write_all(parsed.content.as_bytes())
        .map_err(|e| format!("Error appending to file {}: {e}", display(&path)))?;
    let total = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    Ok(Outcome::ok(json!({
        "message": "Content appended successfully",
        "path": display(&path),
        "appended_size": parsed.content.len(),
        "new_total_size": total,
    })))
}

fn delete_file(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: FilePathArgs = parse_args(args)?;
    let path = ctx.paths.resolve(&parsed.file_path);
    if !path.exists() {
        return Ok(Outcome::failure(format!("File does not exist: {}", display(&path))));
    }
    if !path.is_file() {
        return Ok(Outcome::failure(format!("Not a file: {}", display(&path))));
    }
    fs::remove_file(&path).map_err(|e| format!("Error deleting file {}: {e}", display(&path)))?;
    Ok(Outcome::ok(json!({
        "message": "File deleted successfully",
        "deleted_path": display(&path),
    })))
}

// ── Folders ─────────────────────────────────────────────────────────

fn create_folder(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: CreateFolderArgs = parse_args(args)?;
    let name = parsed.folder_name.trim();
    if name.is_empty() {
        return Ok(Outcome::failure("Folder name must not be empty"));
    }
    let parent = ctx.paths.resolve(parsed.path.as_deref().unwrap_or("."));
    let target = normalize_lexically(&parent.join(name));
    if target.exists() {
        return Ok(Outcome::failure(format!("Folder already exists: {}", display(&target))));
    }
    fs::create_dir_all(&target)
        .map_err(|e| format!("Error creating folder {}: {e}", display(&target)))?;
    Ok(Outcome::ok(json!({
        "message": format!("Folder '{name}' created successfully"),
        "path": display(&target),
        "folder_name": name,
    })))
}

fn delete_folder(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: DeleteFolderArgs = parse_args(args)?;
    let path = ctx.paths.resolve(&parsed.folder_path);
    let recursive = parsed.recursive.unwrap_or(false);
    if !path.exists() {
        return Ok(Outcome::failure(format!("Folder does not exist: {}", display(&path))));
    }
    if !path.is_dir() {
        return Ok(Outcome::failure(format!("Not a folder: {}", display(&path))));
    }
    if recursive {
        fs::remove_dir_all(&path)
            .map_err(|e| format!("Error deleting folder {}: {e}", display(&path)))?;
    } else {
        let mut entries = fs::read_dir(&path)
            .map_err(|e| format!("Error reading folder {}: {e}", display(&path)))?;
        if entries.next().is_some() {
            return Ok(Outcome::failure(format!(
                "Folder is not empty. Use recursive=true to delete it: {}",
                display(&path)
            )));
        }
        fs::remove_dir(&path)
            .map_err(|e| format!("Error deleting folder {}: {e}", display(&path)))?;
    }
    Ok(Outcome::ok(json!({
        "message": "Folder deleted successfully",
        "deleted_path": display(&path),
        "recursive": recursive,
    })))
}

fn list_directory(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: ListDirectoryArgs = parse_args(args)?;
    let path = ctx.paths.resolve(parsed.path.as_deref().unwrap_or("."));
    if !path.exists() {
        return Ok(Outcome::failure(format!("Directory not found: {}", display(&path))));
    }
    if !path.is_dir() {
        return Ok(Outcome::failure(format!("Not a directory: {}", display(&path))));
    }
    let mut folders = Vec::new();
    let mut files = Vec::new();
    let entries = fs::read_dir(&path)
        .map_err(|e| format!("Error listing directory {}: {e}", display(&path)))?;
    let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let entry_path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if entry_path.is_dir() {
            folders.push(json!({
                "name": name,
                "type": "folder",
                "path": display(&entry_path),
            }));
        } else {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(json!({
                "name": name,
                "type": "file",
                "size": size,
                "path": display(&entry_path),
            }));
        }
    }
    Ok(Outcome::ok(json!({
        "path": display(&path),
        "total_items": folders.len() + files.len(),
        "folder_count": folders.len(),
        "file_count": files.len(),
        "folders": folders,
        "files": files,
    })))
}

// ── Move / copy ─────────────────────────────────────────────────────

fn move_file(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: MoveArgs = parse_args(args)?;
    let source = ctx.paths.resolve(&parsed.source_path);
    if !source.exists() {
        return Ok(Outcome::failure(format!("Source file not found: {}", display(&source))));
    }
    if !source.is_file() {
        return Ok(Outcome::failure(format!("Source is not a file: {}", display(&source))));
    }
    let destination = destination_for(&source, ctx.paths.resolve(&parsed.destination_path));
    if same_file(&source, &destination) {
        return Ok(Outcome::failure(format!(
            "Source and destination are the same file: {}",
            display(&source)
        )));
    }
    if destination.exists() {
        return Ok(Outcome::failure(format!(
            "Destination already exists: {}",
            display(&destination)
        )));
    }
    ensure_parent(&destination)?;
    if fs::rename(&source, &destination).is_err() {
        // Cross-device moves cannot rename.
        fs::copy(&source, &destination)
            .and_then(|_| fs::remove_file(&source))
            .map_err(|e| format!("Error moving file: {e}"))?;
    }
    Ok(Outcome::ok(json!({
        "message": "File moved successfully",
        "source": display(&source),
        "destination": display(&destination),
    })))
}

fn move_folder(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: MoveArgs = parse_args(args)?;
    let source = ctx.paths.resolve(&parsed.source_path);
    if !source.exists() {
        return Ok(Outcome::failure(format!("Source folder not found: {}", display(&source))));
    }
    if !source.is_dir() {
        return Ok(Outcome::failure(format!("Source is not a folder: {}", display(&source))));
    }
    let destination = ctx.paths.resolve(&parsed.destination_path);
    if destination.exists() {
        return Ok(Outcome::failure(format!(
            "Destination already exists: {}",
            display(&destination)
        )));
    }
    if destination.starts_with(&source) {
        return Ok(Outcome::failure(format!(
            "Cannot move a folder into itself: {}",
            display(&destination)
        )));
    }
    ensure_parent(&destination)?;
    if fs::rename(&source, &destination).is_err() {
        copy_dir_recursive(&source, &destination)
            .and_then(|_| fs::remove_dir_all(&source))
            .map_err(|e| format!("Error moving folder: {e}"))?;
    }
    Ok(Outcome::ok(json!({
        "message": "Folder moved successfully",
        "source": display(&source),
        "destination": display(&destination),
    })))
}

fn copy_file(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: MoveArgs = parse_args(args)?;
    let source = ctx.paths.resolve(&parsed.source_path);
    if !source.exists() {
        return Ok(Outcome::failure(format!("Source file not found: {}", display(&source))));
    }
    if !source.is_file() {
        return Ok(Outcome::failure(format!("Source is not a file: {}", display(&source))));
    }
    let destination = destination_for(&source, ctx.paths.resolve(&parsed.destination_path));
    // fs::copy truncates the destination before reading the source.
    if same_file(&source, &destination) {
        return Ok(Outcome::failure(format!(
            "Source and destination are the same file: {}",
            display(&source)
        )));
    }
    ensure_parent(&destination)?;
    let size = fs::copy(&source, &destination).map_err(|e| format!("Error copying file: {e}"))?;
    Ok(Outcome::ok(json!({
        "message": "File copied successfully",
        "source": display(&source),
        "destination": display(&destination),
        "size": size,
    })))
}

// ── Queries ─────────────────────────────────────────────────────────

fn search_files(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: SearchFilesArgs = parse_args(args)?;
    let directory = ctx.paths.resolve(parsed.directory.as_deref().unwrap_or("."));
    let pattern_text = parsed.pattern.unwrap_or_else(|| "*".to_string());
    let recursive = parsed.recursive.unwrap_or(false);
    if !directory.exists() {
        return Ok(Outcome::failure(format!("Directory not found: {}", display(&directory))));
    }
    if !directory.is_dir() {
        return Ok(Outcome::failure(format!("Not a directory: {}", display(&directory))));
    }
    let pattern = match Pattern::new(&pattern_text) {
        Ok(p) => p,
        Err(e) => return Ok(Outcome::failure(format!("Invalid pattern '{pattern_text}': {e}"))),
    };
    let match_relative = pattern_text.contains('/');
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut files = Vec::new();
    let mut truncated = false;
    for entry in WalkDir::new(&directory)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let matched = if match_relative {
            entry
                .path()
                .strip_prefix(&directory)
                .map(|rel| pattern.matches(&rel.to_string_lossy().replace('\\', "/")))
                .unwrap_or(false)
        } else {
            pattern.matches(&entry.file_name().to_string_lossy())
        };
        if !matched {
            continue;
        }
        if files.len() >= MAX_SEARCH_RESULTS {
            truncated = true;
            break;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        files.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "path": display(entry.path()),
            "size": size,
            "extension": extension_of(entry.path()),
        }));
    }
    let mut fields = json!({
        "directory": display(&directory),
        "pattern": pattern_text,
        "recursive": recursive,
        "count": files.len(),
        "files": files,
    });
    if truncated {
        fields["truncated"] = json!(true);
    }
    Ok(Outcome::ok(fields))
}

fn get_file_info(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: FilePathArgs = parse_args(args)?;
    let path = ctx.paths.resolve(&parsed.file_path);
    if !path.exists() {
        return Ok(Outcome::failure(format!("Path not found: {}", display(&path))));
    }
    let meta = fs::metadata(&path).map_err(|e| format!("Error reading metadata: {e}"))?;
    let is_dir = meta.is_dir();
    Ok(Outcome::ok(json!({
        "name": file_name_of(&path),
        "path": display(&path),
        "type": if is_dir { "directory" } else { "file" },
        "size": meta.len(),
        "created": to_rfc3339(meta.created()),
        "modified": to_rfc3339(meta.modified()),
        "extension": if is_dir { Value::Null } else { json!(extension_of(&path)) },
    })))
}

fn get_file_size(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: FilePathArgs = parse_args(args)?;
    let path = ctx.paths.resolve(&parsed.file_path);
    if !path.exists() {
        return Ok(Outcome::failure(format!("File not found: {}", display(&path))));
    }
    if !path.is_file() {
        return Ok(Outcome::failure(format!("Path is not a file: {}", display(&path))));
    }
    let size = fs::metadata(&path)
        .map_err(|e| format!("Error reading metadata: {e}"))?
        .len();
    Ok(Outcome::ok(json!({
        "path": display(&path),
        "size_bytes": size,
        "size_kb": round2(size as f64 / KB),
        "size_mb": round2(size as f64 / (KB * KB)),
    })))
}

fn get_folder_size(ctx: &ToolContext, args: Value) -> Result<Outcome, String> {
    let parsed: FolderPathArgs = parse_args(args)?;
    let path = ctx.paths.resolve(&parsed.folder_path);
    if !path.exists() {
        return Ok(Outcome::failure(format!("Folder not found: {}", display(&path))));
    }
    if !path.is_dir() {
        return Ok(Outcome::failure(format!("Not a folder: {}", display(&path))));
    }
    let mut total: u64 = 0;
    let mut file_count = 0usize;
    let mut folder_count = 0usize;
    for entry in WalkDir::new(&path).min_depth(1).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_dir() {
            folder_count += 1;
        } else if entry.file_type().is_file() {
            file_count += 1;
            total += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    let bytes = total as f64;
    Ok(Outcome::ok(json!({
        "path": display(&path),
        "total_size_bytes": total,
        "total_size_kb": round2(bytes / KB),
        "total_size_mb": round2(bytes / (KB * KB)),
        "total_size_gb": round2(bytes / (KB * KB * KB)),
        "file_count": file_count,
        "folder_count": folder_count,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_in(root: &Path) -> ToolContext {
        let desktop = root.join("Desktop");
        fs::create_dir_all(&desktop).unwrap();
        ToolContext::new(
            PathResolver::new(desktop, Some(root.to_path_buf()), root.to_path_buf()),
            None,
        )
    }

    fn run(ctx: &ToolContext, name: &str, args: Value) -> Outcome {
        let exec = file_executor(name).unwrap();
        exec(ctx, args).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn resolves_desktop_keyword_case_insensitively() {
        let resolver = PathResolver::new(
            PathBuf::from("/home/u/Desktop"),
            Some(PathBuf::from("/home/u")),
            PathBuf::from("/work"),
        );
        assert_eq!(resolver.resolve("Desktop"), PathBuf::from("/home/u/Desktop"));
        assert_eq!(resolver.resolve("DESKTOP/notes"), PathBuf::from("/home/u/Desktop/notes"));
        assert_eq!(resolver.resolve("~/docs/../a.txt"), PathBuf::from("/home/u/a.txt"));
        assert_eq!(resolver.resolve("./x/./y"), PathBuf::from("/work/x/y"));
        assert_eq!(resolver.resolve(""), PathBuf::from("/work"));
        assert_eq!(resolver.resolve("desktopper"), PathBuf::from("/work/desktopper"));
    }

    #[test]
    fn create_file_twice_fails_the_second_time() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let args = json!({"filename": "notes.txt", "path": "desktop", "content": "hello"});

        let first = run(&ctx, "create_file_tool", args.clone());
        assert!(first.success);
        let expected = dir.path().join("Desktop").join("notes.txt");
        assert_eq!(first.get("path"), Some(&json!(expected.display().to_string())));
        assert_eq!(first.get("size"), Some(&json!(5)));

        let second = run(&ctx, "create_file_tool", args);
        assert!(!second.success);
        assert!(second.error.unwrap().starts_with("File already exists"));
        assert_eq!(fs::read_to_string(expected).unwrap(), "hello");
    }

    #[test]
    fn create_file_uses_defaults_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let out = run(&ctx, "create_file_tool", json!({"path": "a/b"}));
        assert!(out.success);
        assert!(dir.path().join("a/b/new_file.txt").is_file());
    }

    #[test]
    fn read_write_append_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let written = run(&ctx, "write_file_tool", json!({"file_path": "log.txt", "content": "a"}));
        assert!(written.success);

        let refused = run(&ctx, "write_file_tool", json!({"file_path": "log.txt", "content": "b"}));
        assert!(!refused.success);
        assert!(refused.error.unwrap().contains("overwrite=true"));

        let appended = run(&ctx, "append_to_file_tool", json!({"file_path": "log.txt", "content": "bc"}));
        assert_eq!(appended.get("appended_size"), Some(&json!(2)));
        assert_eq!(appended.get("new_total_size"), Some(&json!(3)));

        let read = run(&ctx, "read_file_tool", json!({"file_path": "log.txt"}));
        assert_eq!(read.get("content"), Some(&json!("abc")));
        assert_eq!(read.get("filename"), Some(&json!("log.txt")));

        let replaced = run(
            &ctx,
            "write_file_tool",
            json!({"file_path": "log.txt", "content": "z", "overwrite": true}),
        );
        assert!(replaced.success);
        assert_eq!(fs::read_to_string(dir.path().join("log.txt")).unwrap(), "z");
    }

    #[test]
    fn read_rejects_binary_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();
        let out = run(&ctx, "read_file_tool", json!({"file_path": "blob.bin"}));
        assert!(out.error.unwrap().contains("binary data"));
        let out = run(&ctx, "read_file_tool", json!({"file_path": "nope.txt"}));
        assert!(out.error.unwrap().starts_with("File not found"));
        let out = run(&ctx, "read_file_tool", json!({"file_path": "Desktop"}));
        assert!(out.error.unwrap().starts_with("Path is not a file"));
    }

    #[test]
    fn delete_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let out = run(&ctx, "delete_file_tool", json!({"file_path": "nonexistent.txt"}));
        assert!(!out.success);
        let expected = dir.path().join("nonexistent.txt");
        assert_eq!(
            out.error,
            Some(format!("File does not exist: {}", expected.display()))
        );
    }

    #[test]
    fn folder_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        assert!(run(&ctx, "create_folder_tool", json!({"folder_name": "proj"})).success);
        let again = run(&ctx, "create_folder_tool", json!({"folder_name": "proj"}));
        assert!(again.error.unwrap().starts_with("Folder already exists"));

        fs::write(dir.path().join("proj/readme.md"), "# hi").unwrap();
        let refused = run(&ctx, "delete_folder_tool", json!({"folder_path": "proj"}));
        assert!(refused.error.unwrap().contains("recursive=true"));
        assert!(dir.path().join("proj/readme.md").exists());

        let deleted = run(
            &ctx,
            "delete_folder_tool",
            json!({"folder_path": "proj", "recursive": true}),
        );
        assert!(deleted.success);
        assert!(!dir.path().join("proj").exists());
    }

    #[test]
    fn list_directory_sorts_folders_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        fs::write(dir.path().join("b.txt"), "bb").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let out = run(&ctx, "list_directory_tool", json!({}));
        assert_eq!(out.get("folder_count"), Some(&json!(1)));
        assert_eq!(out.get("file_count"), Some(&json!(2)));
        assert_eq!(out.get("total_items"), Some(&json!(3)));
        let files = out.get("files").unwrap().as_array().unwrap();
        assert_eq!(files[0]["name"], "a.txt");
        assert_eq!(files[1]["size"], 2);
        assert_eq!(out.get("folders").unwrap()[0]["name"], "Desktop");
    }

    #[test]
    fn move_and_copy_into_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        fs::write(dir.path().join("report.pdf"), "pdf").unwrap();

        let copied = run(
            &ctx,
            "copy_file_tool",
            json!({"source_path": "report.pdf", "destination_path": "desktop"}),
        );
        assert!(copied.success);
        assert!(dir.path().join("Desktop/report.pdf").is_file());
        assert!(dir.path().join("report.pdf").is_file());

        let moved = run(
            &ctx,
            "move_file_tool",
            json!({"source_path": "report.pdf", "destination_path": "archive/2024.pdf"}),
        );
        assert!(moved.success);
        assert!(!dir.path().join("report.pdf").exists());
        assert_eq!(fs::read_to_string(dir.path().join("archive/2024.pdf")).unwrap(), "pdf");
    }

    #[test]
    fn move_folder_refuses_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        fs::create_dir_all(dir.path().join("src/inner")).unwrap();
        fs::create_dir_all(dir.path().join("dst")).unwrap();
        let out = run(
            &ctx,
            "move_folder_tool",
            json!({"source_path": "src", "destination_path": "dst"}),
        );
        assert!(out.error.unwrap().starts_with("Destination already exists"));

        let out = run(
            &ctx,
            "move_folder_tool",
            json!({"source_path": "src", "destination_path": "renamed"}),
        );
        assert!(out.success);
        assert!(dir.path().join("renamed/inner").is_dir());
    }

    #[test]
    fn copy_onto_itself_keeps_the_content() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        fs::write(dir.path().join("keep.txt"), "precious data").unwrap();

        for destination in [".", "keep.txt", "./keep.txt"] {
            let out = run(
                &ctx,
                "copy_file_tool",
                json!({"source_path": "keep.txt", "destination_path": destination}),
            );
            assert!(!out.success, "copy to {destination} should fail");
            assert!(out
                .error
                .unwrap()
                .starts_with("Source and destination are the same file"));
        }
        assert_eq!(fs::read_to_string(dir.path().join("keep.txt")).unwrap(), "precious data");
    }

    #[test]
    fn copy_overwrites_a_different_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        fs::write(dir.path().join("a.txt"), "new").unwrap();
        fs::write(dir.path().join("b.txt"), "old contents").unwrap();
        let out = run(
            &ctx,
            "copy_file_tool",
            json!({"source_path": "a.txt", "destination_path": "b.txt"}),
        );
        assert!(out.success);
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "new");
    }

    #[test]
    fn move_onto_itself_fails_and_keeps_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        fs::write(dir.path().join("keep.txt"), "precious data").unwrap();
        let out = run(
            &ctx,
            "move_file_tool",
            json!({"source_path": "keep.txt", "destination_path": "."}),
        );
        assert!(out
            .error
            .unwrap()
            .starts_with("Source and destination are the same file"));
        assert_eq!(fs::read_to_string(dir.path().join("keep.txt")).unwrap(), "precious data");
    }

    #[test]
    fn move_refuses_to_replace_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        fs::write(dir.path().join("a.txt"), "first").unwrap();
        fs::write(dir.path().join("b.txt"), "second").unwrap();
        let out = run(
            &ctx,
            "move_file_tool",
            json!({"source_path": "a.txt", "destination_path": "b.txt"}),
        );
        assert!(!out.success);
        assert!(out.error.unwrap().starts_with("Destination already exists"));
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "first");
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "second");
    }

    #[test]
    fn search_files_by_glob() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        fs::create_dir_all(dir.path().join("docs/deep")).unwrap();
        fs::write(dir.path().join("docs/a.pdf"), "1").unwrap();
        fs::write(dir.path().join("docs/deep/b.pdf"), "22").unwrap();
        fs::write(dir.path().join("docs/c.txt"), "3").unwrap();

        let flat = run(
            &ctx,
            "search_files_tool",
            json!({"directory": "docs", "pattern": "*.pdf"}),
        );
        assert_eq!(flat.get("count"), Some(&json!(1)));

        let deep = run(
            &ctx,
            "search_files_tool",
            json!({"directory": "docs", "pattern": "*.pdf", "recursive": true}),
        );
        assert_eq!(deep.get("count"), Some(&json!(2)));
        let files = deep.get("files").unwrap().as_array().unwrap();
        assert!(files.iter().all(|f| f["extension"] == ".pdf"));

        let bad = run(&ctx, "search_files_tool", json!({"pattern": "[", "directory": "docs"}));
        assert!(bad.error.unwrap().starts_with("Invalid pattern"));
    }

    #[test]
    fn size_queries() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        fs::create_dir_all(dir.path().join("data/sub")).unwrap();
        fs::write(dir.path().join("data/one.bin"), vec![0u8; 2048]).unwrap();
        fs::write(dir.path().join("data/sub/two.bin"), vec![0u8; 1024]).unwrap();

        let file = run(&ctx, "get_file_size_tool", json!({"file_path": "data/one.bin"}));
        assert_eq!(file.get("size_bytes"), Some(&json!(2048)));
        assert_eq!(file.get("size_kb"), Some(&json!(2.0)));

        let folder = run(&ctx, "get_folder_size_tool", json!({"folder_path": "data"}));
        assert_eq!(folder.get("total_size_bytes"), Some(&json!(3072)));
        assert_eq!(folder.get("file_count"), Some(&json!(2)));
        assert_eq!(folder.get("folder_count"), Some(&json!(1)));

        let info = run(&ctx, "get_file_info_tool", json!({"file_path": "data"}));
        assert_eq!(info.get("type"), Some(&json!("directory")));
        assert_eq!(info.get("extension"), Some(&Value::Null));
        let info = run(&ctx, "get_file_info_tool", json!({"file_path": "data/one.bin"}));
        assert_eq!(info.get("extension"), Some(&json!(".bin")));
    }
}
