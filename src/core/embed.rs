//! 字节码嵌入
//!
//! 可执行文件尾部附加编译好的字节码：
//!
//! ```text
//! [executable][bytecode][footer: magic "LOVEJSBC" (8) | len u32 LE (4) | reserved u32 (4)]
//! ```
//!
//! 读取时从文件末尾定位 footer；magic 不匹配或长度非法都视为没有嵌入数据。

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

/// Footer 魔数
pub const MAGIC: [u8; 8] = *b"LOVEJSBC";

/// Footer 字节数
pub const FOOTER_SIZE: usize = std::mem::size_of::<Footer>();

/// 嵌入错误
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Bytecode is empty")]
    EmptyPayload,
    #[error("Bytecode of {0} bytes does not fit the footer length field")]
    PayloadTooLarge(usize),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> EmbedError + '_ {
    move |source| EmbedError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// On-disk footer layout; integers are little-endian.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Footer {
    magic: [u8; 8],
    len: [u8; 4],
    reserved: [u8; 4],
}

impl Footer {
    pub fn new(len: u32) -> Self {
        Self {
            magic: MAGIC,
            len: len.to_le_bytes(),
            reserved: [0; 4],
        }
    }

    /// Payload length, if the magic matches.
    pub fn payload_len(&self) -> Option<u32> {
        (self.magic == MAGIC).then(|| u32::from_le_bytes(self.len))
    }

    /// Footer at the end of `data`, if any.
    fn read_tail(data: &[u8]) -> Option<Footer> {
        let start = data.len().checked_sub(FOOTER_SIZE)?;
        Some(bytemuck::pod_read_unaligned(&data[start..]))
    }
}

/// Validated payload length for a file of `file_len` bytes ending in `footer`.
fn payload_len(footer: &Footer, file_len: u64) -> Option<u64> {
    let len = u64::from(footer.payload_len()?);
    (len > 0 && len <= file_len - FOOTER_SIZE as u64).then_some(len)
}

/// `data` without a trailing payload, when one is present.
pub fn strip_payload(data: &[u8]) -> &[u8] {
    let Some(footer) = Footer::read_tail(data) else {
        return data;
    };
    match payload_len(&footer, data.len() as u64) {
        Some(len) => &data[..data.len() - FOOTER_SIZE - len as usize],
        None => data,
    }
}

/// `executable` (minus any previous payload) followed by `bytecode` and a footer.
pub fn append_payload(executable: &[u8], bytecode: &[u8]) -> Result<Vec<u8>, EmbedError> {
    if bytecode.is_empty() {
        return Err(EmbedError::EmptyPayload);
    }
    let len = u32::try_from(bytecode.len()).map_err(|_| EmbedError::PayloadTooLarge(bytecode.len()))?;
    let base = strip_payload(executable);

    let mut out = Vec::with_capacity(base.len() + bytecode.len() + FOOTER_SIZE);
    out.extend_from_slice(base);
    out.extend_from_slice(bytecode);
    out.extend_from_slice(bytemuck::bytes_of(&Footer::new(len)));
    Ok(out)
}

/// 从文件读取嵌入的字节码；没有嵌入数据时返回 `Ok(None)`
pub fn read_payload(path: &Path) -> Result<Option<Vec<u8>>, EmbedError> {
    let mut file = File::open(path).map_err(io_error(path))?;
    let file_len = file.metadata().map_err(io_error(path))?.len();
    if file_len < FOOTER_SIZE as u64 {
        return Ok(None);
    }

    let mut footer = Footer::zeroed();
    file.seek(SeekFrom::End(-(FOOTER_SIZE as i64))).map_err(io_error(path))?;
    file.read_exact(bytemuck::bytes_of_mut(&mut footer)).map_err(io_error(path))?;
    let Some(len) = payload_len(&footer, file_len) else {
        tracing::debug!(target: "embed", "no payload in {}", path.display());
        return Ok(None);
    };

    let mut payload = vec![0u8; len as usize];
    file.seek(SeekFrom::End(-((FOOTER_SIZE as u64 + len) as i64))).map_err(io_error(path))?;
    file.read_exact(&mut payload).map_err(io_error(path))?;
    tracing::debug!(target: "embed", "read {} bytes of embedded bytecode from {}", len, path.display());
    Ok(Some(payload))
}

/// 嵌入在当前可执行文件中的字节码
pub fn read_current_exe() -> Result<Option<Vec<u8>>, EmbedError> {
    let exe = std::env::current_exe().map_err(io_error(Path::new("<current exe>")))?;
    read_payload(&exe)
}

/// 以 `source_exe` 为基础写出携带 `bytecode` 的可执行文件
pub fn create_executable(source_exe: &Path, bytecode: &[u8], output: &Path) -> Result<(), EmbedError> {
    let executable = fs::read(source_exe).map_err(io_error(source_exe))?;
    let data = append_payload(&executable, bytecode)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    fs::write(output, &data).map_err(io_error(output))?;
    set_executable(output)?;

    tracing::info!(
        target: "embed",
        "wrote {} ({} bytes, {} bytes of bytecode)",
        output.display(),
        data.len(),
        bytecode.len()
    );
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), EmbedError> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path).map_err(io_error(path))?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions).map_err(io_error(path))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), EmbedError> {
    Ok(())
}
