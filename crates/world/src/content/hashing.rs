use std::fs;

use sha2::{Digest, Sha256};

use super::discovery::{collect_xml_files, ModSource};
use super::types::ContentPlanError;

#[derive(Debug, Clone)]
pub(crate) struct ContentInputHash {
    pub xml_file_count: usize,
    pub hash: [u8; 32],
}

impl ContentInputHash {
    pub fn hash_hex(&self) -> String {
        to_hex_lower(&self.hash)
    }
}

/// Hashes the ordered mod list together with every source xml file, so reordering mods,
/// editing a file or adding one all produce a new hash.
pub(crate) fn hash_content_inputs(
    sources: &[ModSource],
) -> Result<ContentInputHash, ContentPlanError> {
    let mut hasher = Sha256::new();
    let mut xml_file_count = 0usize;

    for source in sources {
        hasher.update(source.mod_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(source.mod_load_index.to_le_bytes());

        for (normalized_rel, abs_path) in collect_xml_files(&source.source_dir)? {
            let bytes = fs::read(&abs_path).map_err(|error| ContentPlanError::ReadFile {
                path: abs_path.clone(),
                source: error,
            })?;
            hasher.update(normalized_rel.as_bytes());
            hasher.update([0u8]);
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
            xml_file_count += 1;
        }
    }

    Ok(ContentInputHash {
        xml_file_count,
        hash: hasher.finalize().into(),
    })
}

pub(crate) fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;

    fn source(mod_id: &str, index: u32, dir: &Path) -> ModSource {
        ModSource {
            mod_id: mod_id.to_string(),
            mod_load_index: index,
            source_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn mod_order_changes_hash() {
        let temp = TempDir::new().expect("tempdir");
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::create_dir_all(&a).expect("mkdir a");
        fs::create_dir_all(&b).expect("mkdir b");

        let first = hash_content_inputs(&[source("a", 1, &a), source("b", 2, &b)]).expect("hash");
        let second = hash_content_inputs(&[source("b", 1, &b), source("a", 2, &a)]).expect("hash");
        assert_ne!(first.hash, second.hash);
    }

    #[test]
    fn hash_ignores_non_xml_and_changes_on_edit_or_add() {
        let temp = TempDir::new().expect("tempdir");
        let dir = temp.path();
        fs::create_dir_all(dir.join("nested")).expect("mkdir");
        fs::write(dir.join("nested").join("cells.xml"), "<Defs/>").expect("write defs");
        fs::write(dir.join("notes.txt"), "ignore me").expect("write txt");
        let sources = [source("base", 0, dir)];

        let first = hash_content_inputs(&sources).expect("hash");
        assert_eq!(first.xml_file_count, 1);

        fs::write(dir.join("notes.txt"), "still ignored").expect("edit txt");
        assert_eq!(hash_content_inputs(&sources).expect("hash").hash, first.hash);

        fs::write(dir.join("nested").join("cells.xml"), "<Defs><A/></Defs>").expect("edit");
        let second = hash_content_inputs(&sources).expect("hash");
        assert_ne!(first.hash, second.hash);

        fs::write(dir.join("objects.xml"), "<Defs/>").expect("add xml");
        let third = hash_content_inputs(&sources).expect("hash");
        assert_eq!(third.xml_file_count, 2);
        assert_ne!(second.hash, third.hash);
        assert_eq!(third.hash_hex().len(), 64);
    }

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(to_hex_lower(&[0x00, 0x0f, 0xab]), "000fab");
    }
}
