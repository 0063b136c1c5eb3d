use std::io;
use std::path::Path;

use tokio::io::AsyncReadExt;

/// Buffer size for file I/O operations (128KB for optimal throughput)
pub const BUFFER_SIZE: usize = 128 * 1024;

/// Hash a file with BLAKE3, streaming in chunks so large files never have to
/// fit in memory. Returns the lowercase hex digest.
pub async fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}
