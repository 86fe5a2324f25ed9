//! Face ID patching
//!
//! Writes the 9-byte device-visible face ID into an artifact whose layout
//! may be unknown (e.g. produced by the external compiler). The slot is
//! located heuristically, first match wins:
//! 1. fixed offset 40, if the file holds at least 49 bytes
//! 2. right after the first `ID:` signature, if 9 bytes follow it
//! 3. offset 0, if the file holds at least 9 bytes
//! 4. otherwise `ID:` + id is appended, growing the file by 12 bytes

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Length of a face ID in bytes.
pub const FACE_ID_LEN: usize = 9;

/// Offset probed first for the ID slot.
pub const FIXED_OFFSET: usize = 40;

/// Marker that precedes an ID slot.
pub const SIGNATURE: &[u8; 3] = b"ID:";

/// Number of bytes the append strategy adds.
pub const APPEND_LEN: usize = SIGNATURE.len() + FACE_ID_LEN;

/// Errors for patch operations
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("invalid face ID {id:?}: {reason}")]
    InvalidIdentifier { id: String, reason: String },

    #[error("ID position {offset} is beyond file size {len} in {}", path.display())]
    PositionOutOfBounds {
        path: PathBuf,
        offset: usize,
        len: usize,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PatchError {
    fn io(path: &Path, source: io::Error) -> Self {
        PatchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A validated 9-character ASCII face ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaceId([u8; FACE_ID_LEN]);

impl FaceId {
    pub fn new(id: &str) -> Result<Self, PatchError> {
        if !id.is_ascii() {
            return Err(PatchError::InvalidIdentifier {
                id: id.to_string(),
                reason: "must contain only ASCII characters".to_string(),
            });
        }
        let bytes: [u8; FACE_ID_LEN] =
            id.as_bytes()
                .try_into()
                .map_err(|_| PatchError::InvalidIdentifier {
                    id: id.to_string(),
                    reason: format!(
                        "must be exactly {} characters long, got {}",
                        FACE_ID_LEN,
                        id.len()
                    ),
                })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; FACE_ID_LEN] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FaceId {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Which locate rule produced an in-place slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStrategy {
    FixedOffset,
    Signature,
    FileStart,
}

impl SlotStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStrategy::FixedOffset => "fixed_offset",
            SlotStrategy::Signature => "signature",
            SlotStrategy::FileStart => "file_start",
        }
    }
}

/// An in-place ID slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub offset: usize,
    pub strategy: SlotStrategy,
}

/// What a patch did to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Bytes `[offset, offset + 9)` were overwritten.
    PatchedAt {
        offset: usize,
        strategy: SlotStrategy,
    },
    /// `ID:` + id was written at the old end of file.
    Appended { new_len: u64 },
}

/// Locate the ID slot in `bytes`, or `None` if the ID must be appended.
pub fn locate_slot(bytes: &[u8]) -> Option<Slot> {
    if bytes.len() >= FIXED_OFFSET + FACE_ID_LEN {
        return Some(Slot {
            offset: FIXED_OFFSET,
            strategy: SlotStrategy::FixedOffset,
        });
    }

    if let Some(pos) = bytes
        .windows(SIGNATURE.len())
        .position(|w| w == SIGNATURE)
    {
        let offset = pos + SIGNATURE.len();
        if offset + FACE_ID_LEN <= bytes.len() {
            return Some(Slot {
                offset,
                strategy: SlotStrategy::Signature,
            });
        }
    }

    if bytes.len() >= FACE_ID_LEN {
        return Some(Slot {
            offset: 0,
            strategy: SlotStrategy::FileStart,
        });
    }

    None
}

/// Write `id` into the artifact at `path`.
pub fn set_identifier(path: &Path, id: &str) -> Result<PatchOutcome, PatchError> {
    let id = FaceId::new(id)?;
    patch_file(path, &id)
}

/// Write an already validated face ID into the artifact at `path`.
pub fn patch_file(path: &Path, id: &FaceId) -> Result<PatchOutcome, PatchError> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| PatchError::io(path, e))?;

    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .map_err(|e| PatchError::io(path, e))?;

    let outcome = match locate_slot(&contents) {
        Some(slot) => {
            if slot.offset + FACE_ID_LEN > contents.len() {
                return Err(PatchError::PositionOutOfBounds {
                    path: path.to_path_buf(),
                    offset: slot.offset,
                    len: contents.len(),
                });
            }
            if slot.strategy == SlotStrategy::FileStart {
                warn!(
                    path = %path.display(),
                    len = contents.len(),
                    "no ID slot found, overwriting the first {} bytes",
                    FACE_ID_LEN
                );
            }
            write_at(&mut file, slot.offset as u64, id.as_bytes())
                .map_err(|e| PatchError::io(path, e))?;
            debug!(
                path = %path.display(),
                offset = slot.offset,
                strategy = slot.strategy.as_str(),
                "patched face ID in place"
            );
            PatchOutcome::PatchedAt {
                offset: slot.offset,
                strategy: slot.strategy,
            }
        }
        None => {
            let old_len = contents.len() as u64;
            append_id(&mut file, path, old_len, id).map_err(|e| PatchError::io(path, e))?;
            let new_len = old_len + APPEND_LEN as u64;
            debug!(path = %path.display(), new_len, "appended face ID");
            PatchOutcome::Appended { new_len }
        }
    };

    file.sync_all().map_err(|e| PatchError::io(path, e))?;
    Ok(outcome)
}

fn write_at(file: &mut File, offset: u64, bytes: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)
}

/// Append `ID:` + id; on failure the file is cut back to `old_len`.
fn append_id(file: &mut File, path: &Path, old_len: u64, id: &FaceId) -> io::Result<()> {
    let mut field = [0u8; APPEND_LEN];
    field[..SIGNATURE.len()].copy_from_slice(SIGNATURE);
    field[SIGNATURE.len()..].copy_from_slice(id.as_bytes());

    if let Err(e) = write_at(file, old_len, &field) {
        if let Err(rollback) = file.set_len(old_len) {
            warn!(
                path = %path.display(),
                old_len,
                error = %rollback,
                "failed to truncate after partial append"
            );
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const ID: &str = "ABCDEFGHI";

    fn artifact(dir: &TempDir, contents: &[u8]) -> PathBuf {
        let path = dir.path().join("face.bin");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_face_id_rejects_bad_lengths() {
        for bad in ["", "12345678", "1234567890"] {
            let err = FaceId::new(bad).unwrap_err();
            assert!(matches!(err, PatchError::InvalidIdentifier { .. }), "{:?}", bad);
        }
    }

    #[test]
    fn test_face_id_rejects_non_ascii() {
        // 9 characters, but not single-byte
        let err = FaceId::new("12345678é").unwrap_err();
        assert!(err.to_string().contains("ASCII"));
    }

    #[test]
    fn test_face_id_display() {
        assert_eq!(FaceId::new("123456789").unwrap().to_string(), "123456789");
    }

    #[test]
    fn test_locate_prefers_fixed_offset() {
        let mut bytes = vec![0u8; 60];
        bytes[5..8].copy_from_slice(SIGNATURE);
        assert_eq!(
            locate_slot(&bytes),
            Some(Slot {
                offset: 40,
                strategy: SlotStrategy::FixedOffset
            })
        );
    }

    #[test]
    fn test_locate_fixed_offset_boundary() {
        assert_eq!(locate_slot(&[0u8; 49]).unwrap().strategy, SlotStrategy::FixedOffset);
        assert_ne!(locate_slot(&[0u8; 48]).unwrap().strategy, SlotStrategy::FixedOffset);
    }

    #[test]
    fn test_locate_signature_needs_room() {
        let mut bytes = vec![b'.'; 20];
        bytes[10..13].copy_from_slice(SIGNATURE);
        // 7 bytes follow the signature: not enough, so offset 0 wins
        assert_eq!(
            locate_slot(&bytes),
            Some(Slot {
                offset: 0,
                strategy: SlotStrategy::FileStart
            })
        );
    }

    #[test]
    fn test_locate_uses_first_signature() {
        let mut bytes = vec![b'.'; 40];
        bytes[2..5].copy_from_slice(SIGNATURE);
        bytes[20..23].copy_from_slice(SIGNATURE);
        assert_eq!(
            locate_slot(&bytes),
            Some(Slot {
                offset: 5,
                strategy: SlotStrategy::Signature
            })
        );
    }

    #[test]
    fn test_locate_small_file_appends() {
        assert_eq!(locate_slot(b"12345678"), None);
        assert_eq!(locate_slot(b""), None);
    }

    #[test]
    fn test_patch_fixed_offset() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, &[0u8; 64]);

        let outcome = set_identifier(&path, ID).unwrap();
        assert_eq!(
            outcome,
            PatchOutcome::PatchedAt {
                offset: 40,
                strategy: SlotStrategy::FixedOffset
            }
        );

        let data = fs::read(&path).unwrap();
        assert_eq!(data.len(), 64);
        assert_eq!(&data[40..49], ID.as_bytes());
        assert!(data[..40].iter().all(|&b| b == 0));
        assert!(data[49..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_patch_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, &[7u8; 49]);

        set_identifier(&path, ID).unwrap();
        set_identifier(&path, ID).unwrap();

        let data = fs::read(&path).unwrap();
        assert_eq!(data.len(), 49);
        assert_eq!(&data[40..49], ID.as_bytes());
    }

    #[test]
    fn test_patch_after_signature() {
        let dir = TempDir::new().unwrap();
        let mut contents = b"header-ID:".to_vec();
        contents.extend_from_slice(b"000000000tail");
        let path = artifact(&dir, &contents);

        let outcome = set_identifier(&path, ID).unwrap();
        assert_eq!(
            outcome,
            PatchOutcome::PatchedAt {
                offset: 10,
                strategy: SlotStrategy::Signature
            }
        );

        let data = fs::read(&path).unwrap();
        assert_eq!(data, b"header-ID:ABCDEFGHItail");
    }

    #[test]
    fn test_patch_file_start() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, b"0123456789AB");

        let outcome = set_identifier(&path, ID).unwrap();
        assert_eq!(
            outcome,
            PatchOutcome::PatchedAt {
                offset: 0,
                strategy: SlotStrategy::FileStart
            }
        );
        assert_eq!(fs::read(&path).unwrap(), b"ABCDEFGHI9AB");
    }

    #[test]
    fn test_patch_appends_to_small_file() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, b"abc");

        let outcome = set_identifier(&path, ID).unwrap();
        assert_eq!(outcome, PatchOutcome::Appended { new_len: 15 });
        assert_eq!(fs::read(&path).unwrap(), b"abcID:ABCDEFGHI");
    }

    #[test]
    fn test_patch_appends_to_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, b"");

        let outcome = set_identifier(&path, ID).unwrap();
        assert_eq!(outcome, PatchOutcome::Appended { new_len: 12 });
        assert_eq!(fs::read(&path).unwrap(), b"ID:ABCDEFGHI");
    }

    #[test]
    fn test_failed_append_reports_error_and_keeps_file() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, b"abc");

        // Read-only handle: neither the append nor the rollback can succeed.
        let mut file = File::open(&path).unwrap();
        let id = FaceId::new(ID).unwrap();
        assert!(append_id(&mut file, &path, 3, &id).is_err());
        assert_eq!(fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_invalid_id_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, b"abc");

        let err = set_identifier(&path, "short").unwrap_err();
        assert!(matches!(err, PatchError::InvalidIdentifier { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = set_identifier(&dir.path().join("nope.face"), ID).unwrap_err();
        match err {
            PatchError::Io { path, .. } => assert!(path.ends_with("nope.face")),
            other => panic!("expected Io, got {:?}", other),
        }
    }
}
