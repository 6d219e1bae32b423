use std::fs;
use std::path::Path;

use programs::ProgramDescriptor;

use crate::error::PipelineError;

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Both stages of a program, decoded into SPIR-V words.
#[derive(Debug, Clone)]
pub struct ProgramBinaries {
    pub name: String,
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ProgramBinaries {
    /// Reads both stages. Either stage being unreadable yields
    /// [`PipelineError::Missing`]; a readable file that is not SPIR-V yields
    /// [`PipelineError::Malformed`].
    pub fn load(program: &ProgramDescriptor) -> Result<Self, PipelineError> {
        let vertex = read_words(&program.vertex_path)?;
        let fragment = read_words(&program.fragment_path)?;
        Ok(Self {
            name: program.name.clone(),
            vertex,
            fragment,
        })
    }
}

fn read_words(path: &Path) -> Result<Vec<u32>, PipelineError> {
    let bytes = fs::read(path).map_err(|source| PipelineError::Missing {
        path: path.to_path_buf(),
        source,
    })?;
    decode_words(&bytes).map_err(|reason| PipelineError::Malformed {
        path: path.to_path_buf(),
        reason,
    })
}

/// Decodes a SPIR-V module, accepting either byte order and returning words
/// in host order.
pub fn decode_words(bytes: &[u8]) -> Result<Vec<u32>, String> {
    if bytes.is_empty() {
        return Err("file is empty".into());
    }
    if bytes.len() % 4 != 0 {
        return Err(format!(
            "size {} is not a multiple of 4 bytes",
            bytes.len()
        ));
    }

    let mut header = [0u8; 4];
    header.copy_from_slice(&bytes[..4]);
    let from_word: fn([u8; 4]) -> u32 = if u32::from_le_bytes(header) == SPIRV_MAGIC {
        u32::from_le_bytes
    } else if u32::from_be_bytes(header) == SPIRV_MAGIC {
        u32::from_be_bytes
    } else {
        return Err(format!(
            "missing SPIR-V magic number (found {:#010x})",
            u32::from_le_bytes(header)
        ));
    };

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| from_word([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|word| word.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_little_and_big_endian_modules() {
        let little = module_bytes(&[SPIRV_MAGIC, 0x0001_0000, 7]);
        assert_eq!(
            decode_words(&little).unwrap(),
            vec![SPIRV_MAGIC, 0x0001_0000, 7]
        );

        let big: Vec<u8> = [SPIRV_MAGIC, 0x0001_0000]
            .iter()
            .flat_map(|word| word.to_be_bytes())
            .collect();
        assert_eq!(decode_words(&big).unwrap(), vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn rejects_truncated_or_foreign_files() {
        assert!(decode_words(&[]).is_err());
        assert!(decode_words(&[0x03, 0x02, 0x23, 0x07, 0x00]).is_err());
        assert!(decode_words(b"#version 450").is_err());
    }

    #[test]
    fn missing_stage_is_recoverable() {
        let root = TempDir::new().unwrap();
        fs::write(
            root.path().join("solo.frag.spv"),
            module_bytes(&[SPIRV_MAGIC]),
        )
        .unwrap();
        let program = ProgramDescriptor::new("solo", root.path());

        let err = ProgramBinaries::load(&program).unwrap_err();
        assert!(err.is_recoverable(), "{err}");
    }

    #[test]
    fn malformed_stage_is_fatal() {
        let root = TempDir::new().unwrap();
        fs::write(
            root.path().join("bad.vert.spv"),
            module_bytes(&[SPIRV_MAGIC]),
        )
        .unwrap();
        fs::write(root.path().join("bad.frag.spv"), b"not spirv").unwrap();
        let program = ProgramDescriptor::new("bad", root.path());

        let err = ProgramBinaries::load(&program).unwrap_err();
        assert!(matches!(err, PipelineError::Malformed { ref path, .. } if path.ends_with("bad.frag.spv")));
    }

    #[test]
    fn loads_both_stages() {
        let root = TempDir::new().unwrap();
        fs::write(
            root.path().join("ok.vert.spv"),
            module_bytes(&[SPIRV_MAGIC, 1]),
        )
        .unwrap();
        fs::write(
            root.path().join("ok.frag.spv"),
            module_bytes(&[SPIRV_MAGIC, 2]),
        )
        .unwrap();

        let binaries = ProgramBinaries::load(&ProgramDescriptor::new("ok", root.path())).unwrap();
        assert_eq!(binaries.name, "ok");
        assert_eq!(binaries.vertex, vec![SPIRV_MAGIC, 1]);
        assert_eq!(binaries.fragment, vec![SPIRV_MAGIC, 2]);
    }
}
