mod common;

use common::mount;
use ux_fs::{
    BLOCK_SIZE, DIRECT_BLOCKS, DIRENTS_PER_BLOCK, DeviceError, DirItem, Error, FIRST_DATA_BLOCK,
    MAX_BLOCKS, ROOT_INO,
};

fn names(items: &[DirItem]) -> Vec<&[u8]> {
    items.iter().map(DirItem::name).collect()
}

#[test]
fn add_find_remove() {
    let (_disk, fs) = mount();

    fs.add(ROOT_INO, "x", 42).unwrap();
    assert_eq!(fs.find(ROOT_INO, "x"), Ok(Some(42)));
    // 前缀不算匹配
    assert_eq!(fs.find(ROOT_INO, "xx"), Ok(None));

    assert_eq!(fs.remove(ROOT_INO, "x"), Ok(Some(42)));
    assert_eq!(fs.find(ROOT_INO, "x"), Ok(None));
    // 删除不存在的名字什么也不做
    assert_eq!(fs.remove(ROOT_INO, "x"), Ok(None));
}

#[test]
fn full_width_names() {
    let (_disk, fs) = mount();
    let name = "a".repeat(28);

    fs.add(ROOT_INO, &name, 7).unwrap();
    assert_eq!(fs.find(ROOT_INO, &name), Ok(Some(7)));
    assert_eq!(fs.add(ROOT_INO, &"a".repeat(29), 7), Err(Error::NameTooLong));
    assert_eq!(fs.add(ROOT_INO, "a/b", 7), Err(Error::InvalidName));
    assert_eq!(fs.add(ROOT_INO, "tomb", 0), Err(Error::InvalidInode(0)));
}

#[test]
fn directory_fills_up_then_reuses_tombstones() {
    let (_disk, fs) = mount();
    let capacity = DIRECT_BLOCKS * DIRENTS_PER_BLOCK - 3;

    for i in 0..capacity {
        fs.add(ROOT_INO, &format!("f{i}"), 5).unwrap();
    }
    // 根目录原有一块，其余十五块由 add 分配
    assert_eq!(fs.statfs().free_blocks as usize, MAX_BLOCKS - 4 - (DIRECT_BLOCKS - 1));
    assert_eq!(fs.add(ROOT_INO, "overflow", 5), Err(Error::NoSpace));

    let items: Vec<_> = fs.iterate(ROOT_INO, 0).collect::<Result<_, _>>().unwrap();
    assert_eq!(items.len(), capacity + 3);
    assert_eq!(items.last().unwrap().offset, DIRECT_BLOCKS * BLOCK_SIZE - 32);
    let victim = items.iter().find(|item| item.name() == b"f100").unwrap().offset;

    fs.remove(ROOT_INO, "f100").unwrap();
    fs.add(ROOT_INO, "reused", 6).unwrap();
    let reused = fs
        .iterate(ROOT_INO, 0)
        .map(Result::unwrap)
        .find(|item| item.name() == b"reused")
        .unwrap();
    assert_eq!(reused.offset, victim);
    assert_eq!(fs.add(ROOT_INO, "overflow", 5), Err(Error::NoSpace));
}

#[test]
fn first_fit_prefers_the_earliest_tombstone() {
    let (_disk, fs) = mount();
    for name in ["a", "b", "c"] {
        fs.add(ROOT_INO, name, 9).unwrap();
    }
    fs.remove(ROOT_INO, "c").unwrap();
    fs.remove(ROOT_INO, "a").unwrap();
    fs.add(ROOT_INO, "d", 9).unwrap();

    let items: Vec<_> = fs.iterate(ROOT_INO, 0).collect::<Result<_, _>>().unwrap();
    assert_eq!(names(&items), [&b"."[..], b"..", b"lost+found", b"d", b"b"]);
}

#[test]
fn iteration_resumes_from_an_offset() {
    let (_disk, fs) = mount();
    fs.add(ROOT_INO, "one", 10).unwrap();
    fs.add(ROOT_INO, "two", 11).unwrap();
    fs.remove(ROOT_INO, "one").unwrap();

    let mut iter = fs.iterate(ROOT_INO, 0);
    let first = iter.next().unwrap().unwrap();
    assert_eq!((first.offset, first.name()), (0, &b"."[..]));

    let rest: Vec<_> = fs
        .iterate(ROOT_INO, first.next_offset())
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(names(&rest), [&b".."[..], b"lost+found", b"two"]);
    assert_eq!(rest[2].offset, 4 * 32);
    assert_eq!(rest[2].inode_id(), 11);

    // 不在边界上的偏移向上取整
    let tail: Vec<_> = fs.iterate(ROOT_INO, 33).collect::<Result<_, _>>().unwrap();
    assert_eq!(names(&tail), [&b"lost+found"[..], b"two"]);

    assert!(fs.iterate(ROOT_INO, BLOCK_SIZE).next().is_none());
}

#[test]
fn files_are_not_directories() {
    let (_disk, fs) = mount();
    let file = fs.root().unwrap().create("plain").unwrap();

    assert_eq!(fs.find(file.ino(), "x"), Err(Error::NotADirectory));
    assert_eq!(fs.add(file.ino(), "x", 5), Err(Error::NotADirectory));
    let mut iter = fs.iterate(file.ino(), 0);
    assert_eq!(iter.next(), Some(Err(Error::NotADirectory)));
    assert_eq!(iter.next(), None);
}

#[test]
fn failed_growth_releases_the_new_block() {
    let (disk, fs) = mount();
    // 填满根目录的第一块
    for i in 0..DIRENTS_PER_BLOCK - 3 {
        fs.add(ROOT_INO, &format!("e{i}"), 8).unwrap();
    }
    let before = fs.statfs();

    disk.fail_block(Some(FIRST_DATA_BLOCK + 4));
    assert_eq!(
        fs.add(ROOT_INO, "next", 8),
        Err(Error::DeviceIo(DeviceError::Read {
            block_id: FIRST_DATA_BLOCK + 4
        }))
    );
    disk.fail_block(None);

    assert_eq!(fs.statfs(), before);
    assert_eq!(fs.find(ROOT_INO, "next"), Ok(None));
    let root = fs.root().unwrap().stat().unwrap();
    assert_eq!((root.blocks, root.size), (1, BLOCK_SIZE as u32));

    fs.add(ROOT_INO, "next", 8).unwrap();
    assert_eq!(fs.root().unwrap().stat().unwrap().blocks, 2);
    assert_eq!(fs.find(ROOT_INO, "next"), Ok(Some(8)));
}
