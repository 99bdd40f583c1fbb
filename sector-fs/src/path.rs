/// 返回路径的`(目录部分, 文件名)`。
///
/// 目录部分保留开头的`/`，因而仍能区分绝对与相对路径；
/// 路径以`/`结尾时文件名为空。
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", file)) => ("/", file),
        Some((dir, file)) => (dir, file),
        None => ("", path),
    }
}

#[inline]
pub(crate) fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// 路径中非空的各级名字
#[inline]
pub(crate) fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
