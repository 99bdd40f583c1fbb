mod cli;

use std::fs;
use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use sector_fs::config::SECTOR_SIZE;
use sector_fs::{FileSystem, Session};
use sector_fs_fuse::BlockFile;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    println!("source={:?}\nout={:?}", cli.source, cli.out);

    let block_file = Arc::new(BlockFile::new({
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&cli.out)?;
        fd.set_len(cli.sectors as u64 * SECTOR_SIZE as u64)?;

        fd
    }));

    let fs = FileSystem::format(block_file, cli.sectors).map_err(io::Error::other)?;
    let mut session = Session::new(fs.clone());

    // 逐级建立目标目录
    let mut dir = String::new();
    for name in cli.target_dir.split('/').filter(|s| !s.is_empty()) {
        dir.push('/');
        dir.push_str(name);
        match session.mkdir(&dir) {
            Ok(()) | Err(vfs::Error::AlreadyExists) => (),
            Err(err) => return Err(io::Error::other(err)),
        }
    }
    session.chdir(&cli.target_dir).map_err(io::Error::other)?;

    for entry in fs::read_dir(&cli.source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            log::warn!("skipping non-UTF-8 file name {:?}", entry.file_name());
            continue;
        };

        let data = fs::read(entry.path())?;
        println!("file: {name:?} ({} bytes)", data.len());
        session.create(&name, 0).map_err(io::Error::other)?;
        let fd = session.open(&name).map_err(io::Error::other)?;
        let written = session.write(fd, &data).map_err(io::Error::other)?;
        if written != data.len() {
            return Err(io::Error::other(format!("short write to {name}: {written} bytes")));
        }
        session.close(fd).map_err(io::Error::other)?;
    }

    drop(session);
    fs.shutdown();

    Ok(())
}
