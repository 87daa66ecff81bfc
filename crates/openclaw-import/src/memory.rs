//! Import memory files (MEMORY.md and all markdown files in `memory/`) from OpenClaw.

use std::path::Path;

use tracing::{debug, warn};

use crate::{
    detect::OpenClawDetection,
    report::{CategoryReport, ImportCategory, ImportStatus},
};

/// Import memory files from OpenClaw workspace to Moltis data directory.
///
/// - `MEMORY.md`: Merged if both exist (imported content appended with separator).
/// - `memory/*.md`: All markdown files copied, skipping files that already exist.
///   This includes daily logs (`YYYY-MM-DD.md`), project notes, and any other
///   custom memory files the user created.
///
/// Does NOT import the SQLite vector database (not portable across embedding models).
pub fn import_memory(detection: &OpenClawDetection, dest_data_dir: &Path) -> CategoryReport {
    let mut imported = 0;
    let mut skipped = 0;
    let warnings = Vec::new();
    let mut errors = Vec::new();

    // 1. Import MEMORY.md
    let src_memory = detection.workspace_dir.join("MEMORY.md");
    let dest_memory = dest_data_dir.join("MEMORY.md");

    if src_memory.is_file() {
        match import_memory_file(&src_memory, &dest_memory) {
            Ok(MemoryFileResult::Created) => {
                debug!("imported MEMORY.md (new file)");
                imported += 1;
            },
            Ok(MemoryFileResult::Merged) => {
                debug!("merged MEMORY.md with existing");
                imported += 1;
            },
            Ok(MemoryFileResult::Skipped) => {
                debug!("MEMORY.md already contains imported content, skipping");
                skipped += 1;
            },
            Err(e) => {
                warn!(error = %e, "failed to import MEMORY.md");
                errors.push(format!("failed to import MEMORY.md: {e}"));
            },
        }
    }

    // 2. Import all markdown files from memory/ directory
    let src_memory_dir = detection.workspace_dir.join("memory");
    let dest_memory_dir = dest_data_dir.join("memory");

    if src_memory_dir.is_dir() {
        if let Err(e) = std::fs::create_dir_all(&dest_memory_dir) {
            errors.push(format!("failed to create memory directory: {e}"));
        } else if let Ok(entries) = std::fs::read_dir(&src_memory_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let Some(name) = path.file_name() else {
                    continue;
                };
                let name_str = name.to_string_lossy();
                if !name_str.ends_with(".md") {
                    continue;
                }

                let dest_file = dest_memory_dir.join(name);
                if dest_file.exists() {
                    debug!(file = %name_str, "memory file already exists, skipping");
                    skipped += 1;
                    continue;
                }

                match std::fs::copy(&path, &dest_file) {
                    Ok(_) => {
                        let kind = if looks_like_daily_log(&name_str) {
                            "daily log"
                        } else {
                            "memory file"
                        };
                        debug!(file = %name_str, kind, "imported memory file");
                        imported += 1;
                    },
                    Err(e) => {
                        warn!(file = %name_str, error = %e, "failed to copy memory file");
                        errors.push(format!("failed to copy {name_str}: {e}"));
                    },
                }
            }
        }
    }

    let status = if !errors.is_empty() && imported > 0 {
        ImportStatus::Partial
    } else if !errors.is_empty() {
        ImportStatus::Failed
    } else if imported == 0 {
        ImportStatus::Skipped
    } else {
        ImportStatus::Success
    };

    CategoryReport {
        category: ImportCategory::Memory,
        status,
        items_imported: imported,
        items_updated: 0,
        items_skipped: skipped,
        warnings,
        errors,
    }
}

enum MemoryFileResult {
    Created,
    Merged,
    Skipped,
}

const IMPORT_SEPARATOR: &str = "\n\n<!-- Imported from OpenClaw -->\n\n";

fn import_memory_file(src: &Path, dest: &Path) -> crate::error::Result<MemoryFileResult> {
    let src_content = std::fs::read_to_string(src)?;
    if src_content.trim().is_empty() {
        return Ok(MemoryFileResult::Skipped);
    }

    if !dest.exists() {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, &src_content)?;
        return Ok(MemoryFileResult::Created);
    }

    let dest_content = std::fs::read_to_string(dest)?;

    // Idempotency: if dest already contains the import separator, skip
    if dest_content.contains("<!-- Imported from OpenClaw -->") {
        return Ok(MemoryFileResult::Skipped);
    }

    // Merge: append imported content with separator
    let merged = format!("{dest_content}{IMPORT_SEPARATOR}{src_content}");
    std::fs::write(dest, merged)?;
    Ok(MemoryFileResult::Merged)
}

/// Check if a filename looks like a daily log (YYYY-MM-DD.md).
fn looks_like_daily_log(name: &str) -> bool {
    let stem = name.strip_suffix(".md").unwrap_or(name);
    let parts: Vec<&str> = stem.split('-').collect();
    if parts.len() != 3 {
        return false;
    }
    parts[0].len() == 4
        && parts[1].len() == 2
        && parts[2].len() == 2
        && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit()))
}
