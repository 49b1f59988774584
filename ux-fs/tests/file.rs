mod common;

use common::mount;
use ux_fs::{BLOCK_SIZE, DIRECT_BLOCKS, Error, MAX_FILE_SIZE};

#[test]
fn resolve_allocates_once() {
    let (_disk, fs) = mount();
    let file = fs.root().unwrap().create("data").unwrap();
    let free = fs.statfs().free_blocks;

    assert_eq!(file.resolve_block(DIRECT_BLOCKS, true), Err(Error::FileTooLarge));
    assert_eq!(file.resolve_block(0, false), Ok(None));

    let block = file.resolve_block(0, true).unwrap().unwrap();
    // 数据块加上属性块
    assert_eq!(fs.statfs().free_blocks, free - 2);
    assert_eq!(file.resolve_block(0, false), Ok(Some(block)));
    assert_eq!(file.resolve_block(0, false), Ok(Some(block)));
    assert_eq!(file.resolve_block(0, true), Ok(Some(block)));

    // 之后的块不再需要属性块
    let next = file.resolve_block(5, true).unwrap().unwrap();
    assert_ne!(next, block);
    assert_eq!(fs.statfs().free_blocks, free - 3);

    let stat = file.stat().unwrap();
    assert_eq!(stat.blocks, 2);
    // 只有写入才改变大小
    assert_eq!(stat.size, 0);
}

#[test]
fn holes_read_as_zeros() {
    let (_disk, fs) = mount();
    let file = fs.root().unwrap().create("sparse").unwrap();

    assert_eq!(file.write_at(1000, b"hello"), Ok(5));
    assert_eq!(file.stat().unwrap().size, 1005);
    assert_eq!(file.resolve_block(0, false), Ok(None));
    assert!(file.resolve_block(1, false).unwrap().is_some());

    let mut buf = vec![0xff; 2000];
    assert_eq!(file.read_at(0, &mut buf), Ok(1005));
    assert!(buf[..1000].iter().all(|&b| b == 0));
    assert_eq!(&buf[1000..1005], b"hello");

    assert_eq!(file.read_at(1005, &mut buf), Ok(0));
    assert_eq!(file.read_at(1002, &mut buf[..2]), Ok(2));
    assert_eq!(&buf[..2], b"ll");
}

#[test]
fn writes_span_blocks() {
    let (_disk, fs) = mount();
    let file = fs.root().unwrap().create("big").unwrap();
    let data: Vec<u8> = (0..3 * BLOCK_SIZE + 17).map(|i| (i % 251) as u8).collect();

    assert_eq!(file.write_at(100, &data), Ok(data.len()));
    let mut back = vec![0; data.len()];
    assert_eq!(file.read_at(100, &mut back), Ok(data.len()));
    assert_eq!(back, data);

    // 覆盖写不改变大小
    file.write_at(0, b"head").unwrap();
    assert_eq!(file.stat().unwrap().size as usize, 100 + data.len());
    assert_eq!(file.write_at(50, b""), Ok(0));
    assert_eq!(file.stat().unwrap().size as usize, 100 + data.len());
}

#[test]
fn size_is_capped() {
    let (_disk, fs) = mount();
    let file = fs.root().unwrap().create("capped").unwrap();

    assert_eq!(file.write_at(MAX_FILE_SIZE - 1, b"ab"), Err(Error::FileTooLarge));
    assert_eq!(file.stat().unwrap().size, 0);
    assert_eq!(file.write_at(MAX_FILE_SIZE - 2, b"ab"), Ok(2));
    assert_eq!(file.stat().unwrap().size as usize, MAX_FILE_SIZE);
}

#[test]
fn truncate_keeps_the_attribute_block() {
    let (_disk, fs) = mount();
    let file = fs.root().unwrap().create("t").unwrap();
    let free = fs.statfs().free_blocks;

    file.write_at(0, &[1; 3 * BLOCK_SIZE]).unwrap();
    assert_eq!(fs.statfs().free_blocks, free - 4);

    file.truncate().unwrap();
    let stat = file.stat().unwrap();
    assert_eq!((stat.size, stat.blocks), (0, 0));
    assert_eq!(fs.statfs().free_blocks, free - 1);
    assert_eq!(file.read_at(0, &mut [0; 8]), Ok(0));

    // 重新写入复用属性块
    file.write_at(0, b"again").unwrap();
    assert_eq!(fs.statfs().free_blocks, free - 2);
    assert!(fs.super_block().is_consistent());
}

#[test]
fn directories_refuse_file_io() {
    let (_disk, fs) = mount();
    let root = fs.root().unwrap();
    let ino = root.ino();

    assert_eq!(fs.read_at(ino, 0, &mut [0; 4]), Err(Error::IsADirectory));
    assert_eq!(fs.write_at(ino, 0, b"x"), Err(Error::IsADirectory));
    assert_eq!(fs.resolve_block(ino, 0, true), Err(Error::IsADirectory));
    assert_eq!(fs.truncate(ino), Err(Error::IsADirectory));
}

#[test]
fn offsets_near_the_address_limit() {
    let (_disk, fs) = mount();
    let file = fs.root().unwrap().create("edge").unwrap();
    file.write_at(0, b"abc").unwrap();

    assert_eq!(file.write_at(usize::MAX, b"x"), Err(Error::FileTooLarge));
    assert_eq!(file.write_at(usize::MAX - 1, b""), Err(Error::FileTooLarge));
    assert_eq!(file.stat().unwrap().size, 3);

    let mut buf = [0; 2];
    assert_eq!(file.read_at(usize::MAX, &mut buf), Ok(0));
    assert_eq!(file.read_at(usize::MAX - 1, &mut buf), Ok(0));
    assert_eq!(file.read_at(1, &mut buf), Ok(2));
    assert_eq!(&buf, b"bc");
}
