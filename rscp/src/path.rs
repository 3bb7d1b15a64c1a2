/// Validates that destination path doesn't end with problematic patterns like . or ..
pub fn validate_destination_path(dst_path_str: &str) -> anyhow::Result<()> {
    // check the raw string, Path::file_name() normalizes these away
    let bad_ending = if dst_path_str.ends_with("/.") || dst_path_str == "." {
        Some(("'.' (current directory)", "./"))
    } else if dst_path_str.ends_with("/..") || dst_path_str == ".." {
        Some(("'..' (parent directory)", "../"))
    } else {
        None
    };
    if let Some((what, instead)) = bad_ending {
        return Err(anyhow::anyhow!(
            "Destination path cannot end with {what}.\n\
            If you want to copy into that directory, use '{instead}' instead.\n\
            Example: 'rscp source.txt {instead}' copies source.txt into it as source.txt"
        ));
    }
    Ok(())
}

/// Resolves the destination of one source: "foo/bar -> baz/" becomes "foo/bar -> baz/bar", i.e.
/// a destination ending with '/' is a directory to copy INTO. Otherwise the destination is used
/// as-is.
pub fn resolve_destination_path(
    src_path_str: &str,
    dst_path_str: &str,
) -> anyhow::Result<std::path::PathBuf> {
    validate_destination_path(dst_path_str)?;
    if dst_path_str.ends_with('/') {
        let src_path = std::path::Path::new(src_path_str);
        let src_file_name = src_path.file_name().ok_or_else(|| {
            anyhow::anyhow!("Source path {:?} does not have a basename", src_path)
        })?;
        Ok(std::path::Path::new(dst_path_str).join(src_file_name))
    } else {
        Ok(std::path::PathBuf::from(dst_path_str))
    }
}

/// Splits `SRC... DST` command line paths into (source, destination) pairs.
pub fn resolve_pairs(
    paths: &[String],
) -> anyhow::Result<Vec<(std::path::PathBuf, std::path::PathBuf)>> {
    let Some((dst_string, src_strings)) = paths.split_last() else {
        return Ok(Vec::new());
    };
    if src_strings.is_empty() {
        return Err(anyhow::anyhow!(
            "You must specify a source and a destination path!"
        ));
    }
    if src_strings.len() > 1 && !dst_string.ends_with('/') {
        return Err(anyhow::anyhow!(
            "Multiple sources can only be copied INTO a directory; if this is your intent - follow the \
            destination path with a trailing slash"
        ));
    }
    src_strings
        .iter()
        .map(|src| {
            let dst = resolve_destination_path(src, dst_string)?;
            Ok((std::path::PathBuf::from(src), dst))
        })
        .collect()
}
