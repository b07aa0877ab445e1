use std::sync::Arc;
use std::thread;

use wfs::{Error, Geometry, Owner, StatKind, Wfs};
use wfs::{BLOCK_SIZE, MAX_FILE_SIZE};

fn fresh(inodes: usize, blocks: usize) -> Wfs {
    let geometry = Geometry::new(inodes, blocks);
    let image = vec![0u8; geometry.required_bytes()];
    Wfs::format(Box::new(image), geometry, Owner::default()).unwrap()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}

fn names(wfs: &Wfs, path: &str) -> Vec<String> {
    wfs.readdir(path)
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect()
}

#[test]
fn mkdir_links_into_parent() {
    let wfs = fresh(32, 64);
    let owner = Owner { uid: 1000, gid: 100 };

    let stat = wfs.mkdir("/a", 0o750, owner).unwrap();
    assert_eq!(stat.kind, StatKind::DIR);
    assert_eq!(stat.mode, 0o040750);
    assert_eq!(stat.perm, 0o750);
    assert_eq!(stat.nlink, 2);
    assert_eq!((stat.uid, stat.gid), (1000, 100));
    assert_eq!(stat.size, 0);

    let root = wfs.getattr("/").unwrap();
    assert_eq!(root.nlink, 3);
    assert_eq!(root.size, 32);
    assert_eq!(wfs.getattr("/a/").unwrap(), stat);
}

#[test]
fn mknod_defaults_to_regular_file() {
    let wfs = fresh(32, 64);

    let stat = wfs.mknod("/f", 0o644, Owner::default()).unwrap();
    assert_eq!(stat.kind, StatKind::FILE);
    assert_eq!(stat.mode, 0o100644);
    assert_eq!(stat.nlink, 1);
    assert_eq!(stat.size, 0);
    assert_eq!(stat.blocks, 0);
    assert_eq!(wfs.getattr("/").unwrap().nlink, 2);
}

#[test]
fn create_errors() {
    let wfs = fresh(32, 64);
    wfs.mknod("/f", 0o644, Owner::default()).unwrap();

    assert_eq!(
        wfs.mknod("/f", 0o644, Owner::default()),
        Err(Error::AlreadyExists)
    );
    assert_eq!(
        wfs.mkdir("/", 0o755, Owner::default()),
        Err(Error::AlreadyExists)
    );
    assert_eq!(
        wfs.mkdir("/missing/d", 0o755, Owner::default()),
        Err(Error::NotFound)
    );
    assert_eq!(
        wfs.mknod("/f/g", 0o644, Owner::default()),
        Err(Error::NotADirectory)
    );
    assert_eq!(wfs.getattr("/f/g"), Err(Error::NotADirectory));

    let longest = format!("/{}", "n".repeat(27));
    wfs.mknod(&longest, 0o644, Owner::default()).unwrap();
    let too_long = format!("/{}", "n".repeat(28));
    assert_eq!(
        wfs.mknod(&too_long, 0o644, Owner::default()),
        Err(Error::NameTooLong)
    );
    assert_eq!(wfs.statfs().free_inodes, 29);
}

#[test]
fn dot_names_are_reserved() {
    let wfs = fresh(32, 64);
    wfs.mkdir("/d", 0o755, Owner::default()).unwrap();
    let before = wfs.statfs();

    assert_eq!(
        wfs.mkdir("/.", 0o755, Owner::default()),
        Err(Error::AlreadyExists)
    );
    assert_eq!(
        wfs.mknod("/..", 0o644, Owner::default()),
        Err(Error::AlreadyExists)
    );
    assert_eq!(
        wfs.mknod("/d/..", 0o644, Owner::default()),
        Err(Error::AlreadyExists)
    );
    assert_eq!(
        wfs.mkdir("/d/.", 0o755, Owner::default()),
        Err(Error::AlreadyExists)
    );

    assert_eq!(names(&wfs, "/"), [".", "..", "d"]);
    assert_eq!(names(&wfs, "/d"), [".", ".."]);
    assert_eq!(wfs.getattr("/").unwrap().nlink, 3);
    assert_eq!(wfs.statfs(), before);
}

#[test]
fn readdir_lists_dots_first() {
    let wfs = fresh(32, 64);
    wfs.mkdir("/d", 0o755, Owner::default()).unwrap();
    wfs.mknod("/d/x", 0o644, Owner::default()).unwrap();
    wfs.mkdir("/d/y", 0o755, Owner::default()).unwrap();

    let root = wfs.readdir("/").unwrap();
    assert_eq!(root[0].name, ".");
    assert_eq!(root[1].name, "..");
    assert_eq!(root[0].ino, root[1].ino);

    let entries = wfs.readdir("/d").unwrap();
    let d = wfs.getattr("/d").unwrap();
    assert_eq!(entries[0].ino, d.ino);
    assert_eq!(entries[1].ino, root[0].ino);
    assert_eq!(entries[2].name, "x");
    assert_eq!(entries[2].kind, StatKind::FILE);
    assert_eq!(entries[3].name, "y");
    assert_eq!(entries[3].kind, StatKind::DIR);
    assert_eq!(entries.len(), 4);

    assert_eq!(wfs.readdir("/d/x"), Err(Error::NotADirectory));
    assert_eq!(wfs.readdir("/nope"), Err(Error::NotFound));
}

#[test]
fn round_trip_across_boundaries() {
    let sizes = [0, 1, 511, 512, 513, 3584, 3585, MAX_FILE_SIZE];
    let wfs = fresh(32, 256);

    for (i, &size) in sizes.iter().enumerate() {
        let path = format!("/f{i}");
        let data = pattern(size);
        wfs.mknod(&path, 0o644, Owner::default()).unwrap();
        assert_eq!(wfs.write(&path, &data, 0).unwrap(), size);

        let stat = wfs.getattr(&path).unwrap();
        assert_eq!(stat.size, size as u64);
        assert_eq!(stat.blocks, size.div_ceil(BLOCK_SIZE) as u64);

        let mut buf = vec![0; size + 100];
        assert_eq!(wfs.read(&path, &mut buf, 0).unwrap(), size);
        assert_eq!(&buf[..size], &data[..]);
    }
}

#[test]
fn overwrite_in_place_and_read_window() {
    let wfs = fresh(32, 64);
    wfs.mknod("/f", 0o644, Owner::default()).unwrap();
    wfs.write("/f", &pattern(2000), 0).unwrap();
    let free = wfs.statfs().free_blocks;

    assert_eq!(wfs.write("/f", b"hello", 510).unwrap(), 5);
    assert_eq!(wfs.statfs().free_blocks, free);
    assert_eq!(wfs.getattr("/f").unwrap().size, 2000);

    let mut buf = [0; 5];
    assert_eq!(wfs.read("/f", &mut buf, 510).unwrap(), 5);
    assert_eq!(&buf, b"hello");

    let mut tail = [0; 64];
    assert_eq!(wfs.read("/f", &mut tail, 1990).unwrap(), 10);
    assert_eq!(wfs.read("/f", &mut tail, 2000).unwrap(), 0);
    assert_eq!(wfs.read("/f", &mut tail, 5000).unwrap(), 0);
}

#[test]
fn gap_reads_as_zeros() {
    let wfs = fresh(32, 64);
    wfs.mknod("/f", 0o644, Owner::default()).unwrap();
    wfs.write("/f", b"x", 4000).unwrap();
    assert_eq!(wfs.getattr("/f").unwrap().size, 4001);

    let mut buf = vec![0xff; 4001];
    assert_eq!(wfs.read("/f", &mut buf, 0).unwrap(), 4001);
    assert!(buf[..4000].iter().all(|&b| b == 0));
    assert_eq!(buf[4000], b'x');
}

#[test]
fn reads_past_end_return_nothing() {
    let wfs = fresh(32, 64);
    wfs.mknod("/f", 0o644, Owner::default()).unwrap();
    wfs.write("/f", &pattern(10), 0).unwrap();

    let mut buf = [0; 16];
    assert_eq!(wfs.read("/f", &mut buf, 10), Ok(0));
    assert_eq!(wfs.read("/f", &mut buf, usize::MAX - 4), Ok(0));
    assert_eq!(wfs.read("/f", &mut buf, usize::MAX), Ok(0));
    assert_eq!(
        wfs.write("/f", b"late", usize::MAX - 4),
        Err(Error::NoSpace)
    );

    assert_eq!(wfs.getattr("/f").unwrap().size, 10);
    assert_eq!(wfs.read("/f", &mut buf, 0), Ok(10));
    assert_eq!(buf[..10], pattern(10)[..]);
}

#[test]
fn writes_stop_at_size_ceiling() {
    let wfs = fresh(32, 256);
    wfs.mknod("/f", 0o644, Owner::default()).unwrap();

    assert_eq!(wfs.write("/f", b"z", MAX_FILE_SIZE), Err(Error::NoSpace));
    assert_eq!(wfs.getattr("/f").unwrap().size, 0);

    assert_eq!(wfs.write("/f", &[1; 20], MAX_FILE_SIZE - 10).unwrap(), 10);
    assert_eq!(wfs.getattr("/f").unwrap().size, MAX_FILE_SIZE as u64);
    // 72 个块：71 个数据块加一个索引块
    assert_eq!(wfs.statfs().free_blocks, 256 - 1 - 72);

    assert_eq!(wfs.write("/f", &[], MAX_FILE_SIZE + 1).unwrap(), 0);
}

#[test]
fn read_and_write_reject_directories() {
    let wfs = fresh(32, 64);
    wfs.mkdir("/d", 0o755, Owner::default()).unwrap();
    let mut buf = [0; 8];
    assert_eq!(wfs.read("/d", &mut buf, 0), Err(Error::IsADirectory));
    assert_eq!(wfs.write("/d", b"data", 0), Err(Error::IsADirectory));
    assert_eq!(wfs.read("/gone", &mut buf, 0), Err(Error::NotFound));
}

#[test]
fn inode_exhaustion() {
    let wfs = fresh(32, 64);
    for i in 0..31 {
        wfs.mknod(&format!("/f{i}"), 0o644, Owner::default()).unwrap();
    }
    let before = wfs.statfs();
    assert_eq!(before.free_inodes, 0);

    assert_eq!(
        wfs.mknod("/last", 0o644, Owner::default()),
        Err(Error::NoSpace)
    );
    assert_eq!(wfs.statfs(), before);
    assert_eq!(wfs.getattr("/last"), Err(Error::NotFound));
    assert_eq!(wfs.getattr("/").unwrap().size, 31 * 32);
}

#[test]
fn failed_write_leaves_no_trace() {
    let wfs = fresh(32, 32);
    wfs.mknod("/big", 0o644, Owner::default()).unwrap();
    let before = wfs.statfs();
    assert_eq!(before.free_blocks, 31);

    assert_eq!(
        wfs.write("/big", &pattern(MAX_FILE_SIZE), 0),
        Err(Error::NoSpace)
    );
    assert_eq!(wfs.statfs(), before);
    assert_eq!(wfs.getattr("/big").unwrap().size, 0);

    assert_eq!(wfs.write("/big", &pattern(3000), 0).unwrap(), 3000);
}

#[test]
fn failed_create_releases_inode() {
    let wfs = fresh(32, 32);
    wfs.mkdir("/d", 0o755, Owner::default()).unwrap();
    wfs.mknod("/f", 0o644, Owner::default()).unwrap();
    // 30 个数据块加一个索引块，耗尽剩余空间
    wfs.write("/f", &pattern(30 * BLOCK_SIZE), 0).unwrap();
    let before = wfs.statfs();
    assert_eq!(before.free_blocks, 0);

    assert_eq!(
        wfs.mknod("/d/x", 0o644, Owner::default()),
        Err(Error::NoSpace)
    );
    assert_eq!(wfs.statfs(), before);
    assert_eq!(wfs.getattr("/d").unwrap().size, 0);
    assert_eq!(names(&wfs, "/d"), [".", ".."]);
}

#[test]
fn rmdir_rules() {
    let wfs = fresh(32, 64);
    let empty = wfs.statfs();
    wfs.mkdir("/d", 0o755, Owner::default()).unwrap();
    wfs.mknod("/d/f", 0o644, Owner::default()).unwrap();

    assert_eq!(wfs.rmdir("/d"), Err(Error::DirectoryNotEmpty));
    assert_eq!(wfs.rmdir("/d/f"), Err(Error::NotADirectory));
    assert_eq!(wfs.rmdir("/"), Err(Error::Busy));
    assert_eq!(wfs.rmdir("/x"), Err(Error::NotFound));

    wfs.unlink("/d/f").unwrap();
    wfs.rmdir("/d").unwrap();
    assert_eq!(wfs.getattr("/d"), Err(Error::NotFound));
    assert_eq!(wfs.getattr("/").unwrap().nlink, 2);
    assert_eq!(wfs.getattr("/").unwrap().size, 0);

    // 根目录的块不随目录项移除而回收
    let after = wfs.statfs();
    assert_eq!(after.free_inodes, empty.free_inodes);
    assert_eq!(after.free_blocks, empty.free_blocks - 1);
}

#[test]
fn unlink_frees_blocks_and_reuses_slot() {
    let wfs = fresh(32, 128);
    for name in ["a", "b", "c"] {
        wfs.mknod(&format!("/{name}"), 0o644, Owner::default()).unwrap();
    }
    let before = wfs.statfs();
    wfs.write("/b", &pattern(5000), 0).unwrap();
    assert_eq!(wfs.statfs().free_blocks, before.free_blocks - 11);

    assert_eq!(wfs.unlink("/"), Err(Error::IsADirectory));
    wfs.unlink("/b").unwrap();
    let after = wfs.statfs();
    assert_eq!(after.free_blocks, before.free_blocks);
    assert_eq!(after.free_inodes, before.free_inodes + 1);
    assert_eq!(wfs.unlink("/b"), Err(Error::NotFound));

    wfs.mknod("/z", 0o644, Owner::default()).unwrap();
    assert_eq!(names(&wfs, "/"), [".", "..", "a", "z", "c"]);
}

#[test]
fn unlink_rejects_directories() {
    let wfs = fresh(32, 64);
    wfs.mkdir("/d", 0o755, Owner::default()).unwrap();
    assert_eq!(wfs.unlink("/d"), Err(Error::IsADirectory));
    assert!(wfs.getattr("/d").is_ok());
}

#[test]
fn block_accounting_matches_tree() {
    let wfs = fresh(64, 512);
    wfs.mkdir("/d", 0o755, Owner::default()).unwrap();
    let sizes = [100, 3584, 3585, 9000, 20000];
    for (i, &size) in sizes.iter().enumerate() {
        let path = format!("/d/f{i}");
        wfs.mknod(&path, 0o644, Owner::default()).unwrap();
        wfs.write(&path, &pattern(size), 0).unwrap();
    }

    let mut used = 0;
    for path in ["/", "/d"] {
        used += wfs.getattr(path).unwrap().blocks;
    }
    for i in 0..sizes.len() {
        let blocks = wfs.getattr(&format!("/d/f{i}")).unwrap().blocks;
        used += blocks + u64::from(blocks > 7);
    }

    let statfs = wfs.statfs();
    assert_eq!(statfs.blocks - statfs.free_blocks, used);
    assert_eq!(statfs.inodes - statfs.free_inodes, 2 + sizes.len() as u64);
}

#[test]
fn survives_reopen() {
    let wfs = fresh(32, 64);
    wfs.mkdir("/d", 0o700, Owner::default()).unwrap();
    wfs.mknod("/d/f", 0o600, Owner::default()).unwrap();
    wfs.write("/d/f", &pattern(4000), 0).unwrap();
    let stat = wfs.getattr("/d/f").unwrap();

    let image = wfs.into_inner().into_image();
    let wfs = Wfs::open(image).unwrap();
    assert_eq!(wfs.getattr("/d/f").unwrap(), stat);

    let mut buf = vec![0; 4000];
    wfs.read("/d/f", &mut buf, 0).unwrap();
    assert_eq!(buf, pattern(4000));
}

#[test]
fn two_mib_image() {
    let geometry = Geometry::new(32, 256);
    let image = vec![0u8; 2 << 20];
    let wfs = Wfs::format(Box::new(image), geometry, Owner::default()).unwrap();
    assert_eq!(wfs.statfs().blocks, 256);

    let a = wfs.mkdir("/a", 0o755, Owner::default()).unwrap();
    assert_eq!(wfs.getattr("/a").unwrap().kind, StatKind::DIR);
    assert_eq!(a.nlink, 2);

    wfs.mknod("/a/f", 0o644, Owner::default()).unwrap();
    let data = pattern(1000);
    assert_eq!(wfs.write("/a/f", &data, 0).unwrap(), 1000);

    let mut buf = vec![0; 1000];
    assert_eq!(wfs.read("//a//f", &mut buf, 0).unwrap(), 1000);
    assert_eq!(buf, data);
    assert_eq!(wfs.getattr("/a/f").unwrap().size, 1000);
    assert_eq!(names(&wfs, "/a"), [".", "..", "f"]);

    wfs.unlink("/a/f").unwrap();
    assert_eq!(wfs.getattr("/a/f"), Err(Error::NotFound));
}

#[test]
fn freed_inode_and_slot_come_back_first() {
    let wfs = fresh(32, 64);
    wfs.mknod("/keep", 0o644, Owner::default()).unwrap();
    let gone = wfs.mknod("/gone", 0o644, Owner::default()).unwrap();
    wfs.mknod("/tail", 0o644, Owner::default()).unwrap();

    wfs.unlink("/gone").unwrap();
    let reused = wfs.mknod("/new", 0o644, Owner::default()).unwrap();
    assert_eq!(reused.ino, gone.ino);
    assert_eq!(names(&wfs, "/"), [".", "..", "keep", "new", "tail"]);

    let fs = wfs.into_inner();
    assert!(fs.is_inode_allocated(reused.ino));
    assert!(!fs.is_inode_allocated(reused.ino + 2));
}

#[test]
fn concurrent_callers_serialize() {
    let wfs = Arc::new(fresh(64, 512));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let wfs = Arc::clone(&wfs);
            thread::spawn(move || {
                let path = format!("/t{i}");
                wfs.mknod(&path, 0o644, Owner::default()).unwrap();
                wfs.write(&path, &vec![i as u8; 1500], 0).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..8 {
        let mut buf = vec![0; 1500];
        wfs.read(&format!("/t{i}"), &mut buf, 0).unwrap();
        assert!(buf.iter().all(|&b| b == i as u8));
    }
    assert_eq!(wfs.statfs().free_inodes, 64 - 9);
}
