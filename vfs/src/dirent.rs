#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DirEntryType {
    Directory,
    #[default]
    Regular,
}

impl DirEntryType {
    #[inline]
    pub fn from_is_dir(is_dir: bool) -> Self {
        if is_dir {
            Self::Directory
        } else {
            Self::Regular
        }
    }
}
