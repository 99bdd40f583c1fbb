//! # 会话层
//!
//! 一个调用者的工作目录与文件描述符表。
//! 所有操作经过文件系统的读写闸门：读取共享，写入与名字空间的修改独占。

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;

use vfs::{DirEntryType, Error, Stat};

use crate::config::SECTOR_SIZE;
use crate::layout::DiskInode;
use crate::{Dir, File, FileSystem, Result};

/// 0、1、2 留给标准输入输出
const FD_START: usize = 3;

pub struct Session {
    fs: Arc<FileSystem>,
    /// 工作目录，空表示根目录
    cwd: Option<Dir>,
    fd_table: BTreeMap<usize, Descriptor>,
}

#[derive(Debug)]
struct Descriptor {
    file: File,
    /// 打开的是目录时，用于`readdir`
    dir: Option<Dir>,
}

impl Session {
    pub fn new(fs: Arc<FileSystem>) -> Self {
        Self {
            fs,
            cwd: None,
            fd_table: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn fs(&self) -> &Arc<FileSystem> {
        &self.fs
    }

    /// 创建初始长度为`size`的文件
    pub fn create(&self, path: &str, size: u32) -> Result<()> {
        let _gate = self.fs.gate().write();
        self.fs.create(self.cwd.as_ref(), path, size, false)
    }

    pub fn mkdir(&self, path: &str) -> Result<()> {
        let _gate = self.fs.gate().write();
        self.fs.create(self.cwd.as_ref(), path, 0, true)
    }

    pub fn remove(&self, path: &str) -> Result<()> {
        let _gate = self.fs.gate().write();
        self.fs.remove(self.cwd.as_ref(), path)
    }

    /// 打开文件或目录，返回描述符
    pub fn open(&mut self, path: &str) -> Result<usize> {
        let descriptor = {
            let _gate = self.fs.gate().read();
            let inode = self.fs.open(self.cwd.as_ref(), path)?;
            let file = File::open(inode);
            let dir = file
                .inode()
                .is_dir()
                .then(|| Dir::open(self.fs.inodes().reopen(file.inode())));
            Descriptor { file, dir }
        };

        Ok(self.insert(descriptor))
    }

    /// 打开可执行文件：在描述符关闭前，任何句柄都不能写入它
    pub fn open_executable(&mut self, path: &str) -> Result<usize> {
        let fd = self.open(path)?;
        match self.file_mut(fd) {
            Ok(file) => {
                file.deny_write();
                Ok(fd)
            }
            Err(err) => {
                self.close(fd)?;
                Err(err)
            }
        }
    }

    pub fn filesize(&self, fd: usize) -> Result<u32> {
        let _gate = self.fs.gate().read();
        Ok(self.file(fd)?.length())
    }

    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let fs = self.fs.clone();
        let _gate = fs.gate().read();
        Ok(self.file_mut(fd)?.read(&fs, buf))
    }

    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<usize> {
        let fs = self.fs.clone();
        let _gate = fs.gate().write();
        self.file_mut(fd)?.write(&fs, buf)
    }

    pub fn seek(&mut self, fd: usize, pos: usize) -> Result<()> {
        self.file_mut(fd)?.seek(pos);
        Ok(())
    }

    pub fn tell(&self, fd: usize) -> Result<usize> {
        Ok(self.file(fd)?.tell())
    }

    pub fn close(&mut self, fd: usize) -> Result<()> {
        let descriptor = self.fd_table.remove(&fd).ok_or(Error::BadDescriptor)?;
        let _gate = self.fs.gate().read();
        descriptor.close(&self.fs)
    }

    /// 切换工作目录
    pub fn chdir(&mut self, path: &str) -> Result<()> {
        let dir = {
            let _gate = self.fs.gate().read();
            self.fs.open_dir(self.cwd.as_ref(), path)?
        };

        match self.cwd.replace(dir) {
            Some(old) => old.close(&self.fs),
            None => Ok(()),
        }
    }

    /// 读出目录描述符的下一项名字，不含`.`与`..`
    pub fn readdir(&mut self, fd: usize) -> Result<Option<String>> {
        let fs = self.fs.clone();
        let _gate = fs.gate().read();
        let dir = self
            .descriptor_mut(fd)?
            .dir
            .as_mut()
            .ok_or(Error::NotADirectory)?;

        Ok(dir.readdir(&fs))
    }

    pub fn isdir(&self, fd: usize) -> Result<bool> {
        Ok(self.descriptor(fd)?.dir.is_some())
    }

    pub fn inumber(&self, fd: usize) -> Result<u32> {
        Ok(self.descriptor(fd)?.file.inode().inumber().raw())
    }

    pub fn fstat(&self, fd: usize) -> Result<Stat> {
        let _gate = self.fs.gate().read();
        let inode = self.descriptor(fd)?.file.inode();
        let size = inode.length();

        Ok(Stat {
            mode: DirEntryType::from_is_dir(inode.is_dir()),
            inode: inode.inumber().raw() as u64,
            block_size: SECTOR_SIZE as u64,
            blocks: DiskInode::count_sectors(size) as u64,
            size: size as u64,
        })
    }
}

impl Session {
    /// 分配最小的空闲描述符
    fn insert(&mut self, descriptor: Descriptor) -> usize {
        let fd = (FD_START..)
            .find(|fd| !self.fd_table.contains_key(fd))
            .unwrap_or(FD_START);
        self.fd_table.insert(fd, descriptor);
        fd
    }

    fn descriptor(&self, fd: usize) -> Result<&Descriptor> {
        self.fd_table.get(&fd).ok_or(Error::BadDescriptor)
    }

    fn descriptor_mut(&mut self, fd: usize) -> Result<&mut Descriptor> {
        self.fd_table.get_mut(&fd).ok_or(Error::BadDescriptor)
    }

    /// 普通文件的句柄，目录不能按字节读写
    fn file(&self, fd: usize) -> Result<&File> {
        match self.descriptor(fd)? {
            Descriptor { dir: Some(_), .. } => Err(Error::IsADirectory),
            Descriptor { file, .. } => Ok(file),
        }
    }

    fn file_mut(&mut self, fd: usize) -> Result<&mut File> {
        match self.descriptor_mut(fd)? {
            Descriptor { dir: Some(_), .. } => Err(Error::IsADirectory),
            Descriptor { file, .. } => Ok(file),
        }
    }
}

impl Descriptor {
    fn close(self, fs: &FileSystem) -> Result<()> {
        if let Some(dir) = self.dir {
            dir.close(fs)?;
        }
        self.file.close(fs)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _gate = self.fs.gate().read();
        for (fd, descriptor) in core::mem::take(&mut self.fd_table) {
            if let Err(err) = descriptor.close(&self.fs) {
                log::error!("session: closing fd {fd} failed: {err}");
            }
        }
        if let Some(cwd) = self.cwd.take() {
            if let Err(err) = cwd.close(&self.fs) {
                log::error!("session: closing cwd failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::test_util;

    fn session(sectors: usize) -> Session {
        let (_disk, fs) = test_util::format(sectors);
        Session::new(fs)
    }

    #[test]
    fn descriptors_start_at_three_and_are_reused() {
        let mut session = session(256);
        session.create("/a", 0).unwrap();

        let a = session.open("/a").unwrap();
        let b = session.open("/a").unwrap();
        assert_eq!((a, b), (3, 4));

        session.close(a).unwrap();
        assert_eq!(session.close(a), Err(Error::BadDescriptor));
        assert_eq!(session.open("/a"), Ok(3));
        assert_eq!(session.read(99, &mut [0; 4]), Err(Error::BadDescriptor));
    }

    #[test]
    fn read_write_seek() {
        let mut session = session(256);
        session.create("/f", 0).unwrap();
        let fd = session.open("/f").unwrap();

        assert_eq!(session.write(fd, b"0123456789"), Ok(10));
        assert_eq!(session.filesize(fd), Ok(10));
        assert_eq!(session.tell(fd), Ok(10));

        session.seek(fd, 4).unwrap();
        let mut buf = [0; 3];
        assert_eq!(session.read(fd, &mut buf), Ok(3));
        assert_eq!(&buf, b"456");

        let stat = session.fstat(fd).unwrap();
        assert_eq!(stat.mode, DirEntryType::Regular);
        assert_eq!(stat.size, 10);
        assert_eq!(stat.blocks, 1);
        assert_eq!(stat.inode, session.inumber(fd).unwrap() as u64);
    }

    #[test]
    fn directory_descriptors() {
        let mut session = session(256);
        session.mkdir("/d").unwrap();
        session.create("/d/x", 0).unwrap();
        session.create("/f", 0).unwrap();

        let dir = session.open("/d").unwrap();
        let file = session.open("/f").unwrap();
        assert_eq!(session.isdir(dir), Ok(true));
        assert_eq!(session.isdir(file), Ok(false));

        assert_eq!(session.read(dir, &mut [0; 4]), Err(Error::IsADirectory));
        assert_eq!(session.write(dir, b"x"), Err(Error::IsADirectory));
        assert_eq!(session.filesize(dir), Err(Error::IsADirectory));
        assert_eq!(session.readdir(file), Err(Error::NotADirectory));

        assert_eq!(session.readdir(dir), Ok(Some(String::from("x"))));
        assert_eq!(session.readdir(dir), Ok(None));
        assert_eq!(
            session.fstat(dir).unwrap().mode,
            DirEntryType::Directory
        );
    }

    #[test]
    fn executable_is_write_protected() {
        let mut session = session(256);
        session.create("/prog", 8).unwrap();

        let exe = session.open_executable("/prog").unwrap();
        let fd = session.open("/prog").unwrap();
        assert_eq!(session.write(fd, b"patch"), Ok(0));
        assert_eq!(session.write(exe, b"patch"), Ok(0));

        session.close(exe).unwrap();
        assert_eq!(session.write(fd, b"patch"), Ok(5));

        session.mkdir("/d").unwrap();
        assert_eq!(session.open_executable("/d"), Err(Error::IsADirectory));
    }

    #[test]
    fn write_at_unreachable_position() {
        let mut session = session(256);
        session.create("/f", 0).unwrap();
        let fd = session.open("/f").unwrap();

        session.seek(fd, usize::MAX).unwrap();
        assert_eq!(session.write(fd, b"x"), Err(Error::FileTooLarge));
        assert_eq!(session.tell(fd), Ok(usize::MAX));
        assert_eq!(session.filesize(fd), Ok(0));

        let mut buf = [0; 4];
        assert_eq!(session.read(fd, &mut buf), Ok(0));
    }

    #[test]
    fn chdir_and_relative_paths() {
        let mut session = session(256);
        session.mkdir("/a").unwrap();
        session.chdir("/a").unwrap();
        session.create("b", 3).unwrap();

        let fd = session.open("/a/b").unwrap();
        assert_eq!(session.filesize(fd), Ok(3));
        session.close(fd).unwrap();

        session.chdir("..").unwrap();
        let fd = session.open("a/b").unwrap();
        session.close(fd).unwrap();

        assert_eq!(session.chdir("/a/b"), Err(Error::NotADirectory));
        assert_eq!(session.chdir("/nope"), Err(Error::NotFound));
    }

    #[test]
    fn drop_closes_everything() {
        let (_disk, fs) = test_util::format(256);
        {
            let mut session = Session::new(fs.clone());
            session.mkdir("/a").unwrap();
            session.create("/a/f", 600).unwrap();
            session.chdir("/a").unwrap();
            session.open("f").unwrap();
            session.open(".").unwrap();
        }
        assert!(fs.inodes().is_empty());

        let mut session = Session::new(fs);
        let fd = session.open("/a/f").unwrap();
        let mut buf = vec![1; 600];
        assert_eq!(session.read(fd, &mut buf), Ok(600));
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn sessions_on_threads() {
        let (_disk, fs) = test_util::format(1024);
        Session::new(fs.clone()).mkdir("/shared").unwrap();

        let handles: Vec<_> = (0..6u8)
            .map(|i| {
                let fs = fs.clone();
                std::thread::spawn(move || {
                    let mut session = Session::new(fs);
                    session.chdir("/shared").unwrap();
                    let name = alloc::format!("t{i}");
                    session.create(&name, 0).unwrap();
                    let fd = session.open(&name).unwrap();

                    let data = vec![i; 1500];
                    let mut buf = vec![0; 1500];
                    for _ in 0..4 {
                        session.seek(fd, 0).unwrap();
                        assert_eq!(session.write(fd, &data), Ok(1500));
                        session.seek(fd, 0).unwrap();
                        assert_eq!(session.read(fd, &mut buf), Ok(1500));
                        assert_eq!(buf, data);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut session = Session::new(fs.clone());
        let fd = session.open("/shared").unwrap();
        let mut names: Vec<String> =
            core::iter::from_fn(|| session.readdir(fd).unwrap()).collect();
        names.sort();
        assert_eq!(names, ["t0", "t1", "t2", "t3", "t4", "t5"]);

        drop(session);
        assert!(fs.inodes().is_empty());
    }
}
