// Minimal file-chunk serving (4.9). Deliberately dumb: no cache, no piece
// picker, no choking -- the full chunked-transfer mechanism is out of scope.
use std::path::Path;

use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};

pub async fn file_size(shared_dir: &Path, name: &str) -> i64 {
    match tokio::fs::metadata(shared_dir.join(name)).await {
        Ok(meta) => meta.len() as i64,
        Err(_) => -1,
    }
}

pub async fn read_chunk(shared_dir: &Path, name: &str, offset: u64, size: u32) -> Option<Vec<u8>> {
    let mut file = File::open(shared_dir.join(name)).await.ok()?;
    file.seek(std::io::SeekFrom::Start(offset)).await.ok()?;
    let mut buf = vec![0u8; size as usize];
    let read = file.read(&mut buf).await.ok()?;
    buf.truncate(read);
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn missing_file_reports_size_minus_one_and_no_chunk() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(file_size(dir.path(), "nope.txt").await, -1);
        assert!(read_chunk(dir.path(), "nope.txt", 0, 16).await.is_none());
    }

    #[tokio::test]
    async fn reads_a_byte_range_from_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"hello world")
            .unwrap();

        assert_eq!(file_size(dir.path(), "hello.txt").await, 11);
        let chunk = read_chunk(dir.path(), "hello.txt", 6, 5).await.unwrap();
        assert_eq!(chunk, b"world");
    }
}
