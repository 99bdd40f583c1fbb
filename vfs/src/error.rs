use derive_more::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[display(fmt = "entry already exists")]
    AlreadyExists,
    #[display(fmt = "no such file or directory")]
    NotFound,
    #[display(fmt = "is a directory")]
    IsADirectory,
    #[display(fmt = "not a directory")]
    NotADirectory,
    #[display(fmt = "directory not empty")]
    DirectoryNotEmpty,
    /// 名字为空或超过长度上限
    #[display(fmt = "invalid file name")]
    InvalidName,
    /// 空闲扇区耗尽
    #[display(fmt = "no space left on device")]
    NoSpace,
    /// 超出三级索引所能寻址的最大长度
    #[display(fmt = "file too large")]
    FileTooLarge,
    #[display(fmt = "bad file descriptor")]
    BadDescriptor,
    /// 超级块魔数不符，设备上没有可挂载的文件系统
    #[display(fmt = "bad filesystem magic")]
    BadMagic,
    /// 内部记账失配：扇区计数在递归分配/释放后没有归零。
    /// 属于程序缺陷而非环境错误，调用者须终止当前执行上下文。
    #[display(fmt = "filesystem internal consistency violated")]
    Corrupted,
}

impl Error {
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Corrupted)
    }
}

impl core::error::Error for Error {}
