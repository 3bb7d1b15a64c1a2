use anyhow::Context;
use async_recursion::async_recursion;

#[cfg(test)]
pub async fn create_temp_dir() -> anyhow::Result<std::path::PathBuf> {
    let mut idx = 0;
    loop {
        let tmp_dir = std::env::temp_dir().join(format!("rscp_test{}", &idx));
        if let Err(error) = tokio::fs::create_dir(&tmp_dir).await {
            match error.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    idx += 1;
                }
                _ => return Err(error.into()),
            }
        } else {
            return Ok(tmp_dir);
        }
    }
}

/// Deterministic content whose period (251) does not divide any power-of-two chunk size, so a
/// chunk written at the wrong offset never matches by accident.
#[cfg(test)]
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[cfg(test)]
pub async fn write_pattern_file(path: &std::path::Path, len: usize) -> anyhow::Result<Vec<u8>> {
    let data = pattern(len);
    tokio::fs::write(path, &data)
        .await
        .with_context(|| format!("failed writing test file {path:?}"))?;
    Ok(data)
}

#[cfg(test)]
pub async fn setup_test_dir() -> anyhow::Result<std::path::PathBuf> {
    // create a temporary directory
    let tmp_dir = create_temp_dir().await?;
    // foo
    // |- a          (3000 bytes)
    // |- b
    //    |- c       (1 byte)
    //    |- d
    //       |- e    (empty)
    // |- f          (empty directory)
    let foo_path = tmp_dir.join("foo");
    tokio::fs::create_dir(&foo_path).await?;
    write_pattern_file(&foo_path.join("a"), 3000).await?;
    let b_path = foo_path.join("b");
    tokio::fs::create_dir(&b_path).await?;
    write_pattern_file(&b_path.join("c"), 1).await?;
    let d_path = b_path.join("d");
    tokio::fs::create_dir(&d_path).await?;
    write_pattern_file(&d_path.join("e"), 0).await?;
    tokio::fs::create_dir(foo_path.join("f")).await?;
    Ok(tmp_dir)
}

#[cfg(test)]
#[async_recursion]
pub async fn check_dirs_identical(
    src: &std::path::Path,
    dst: &std::path::Path,
) -> anyhow::Result<()> {
    let mut src_entries = tokio::fs::read_dir(src).await?;
    let mut src_count = 0;
    while let Some(src_entry) = src_entries.next_entry().await? {
        src_count += 1;
        let src_entry_path = src_entry.path();
        let src_entry_name = src_entry.file_name();
        let dst_entry_path = dst.join(&src_entry_name);
        let src_md = tokio::fs::metadata(&src_entry_path)
            .await
            .with_context(|| format!("source {:?} is missing!", &src_entry_path))?;
        let dst_md = tokio::fs::metadata(&dst_entry_path)
            .await
            .with_context(|| format!("destination {:?} is missing!", &dst_entry_path))?;
        assert_eq!(src_md.is_file(), dst_md.is_file(), "{dst_entry_path:?}");
        if src_md.is_file() {
            let src_contents = tokio::fs::read(&src_entry_path).await?;
            let dst_contents = tokio::fs::read(&dst_entry_path).await?;
            assert_eq!(src_contents, dst_contents, "{dst_entry_path:?}");
        } else {
            check_dirs_identical(&src_entry_path, &dst_entry_path).await?;
        }
    }
    let mut dst_entries = tokio::fs::read_dir(dst).await?;
    let mut dst_count = 0;
    while dst_entries.next_entry().await?.is_some() {
        dst_count += 1;
    }
    assert_eq!(src_count, dst_count, "{dst:?} has extra entries");
    Ok(())
}
