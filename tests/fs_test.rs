use minifs::{FileSystem, FsError, MAX_FILE_LEN};
use tempfile::{tempdir, NamedTempFile};

fn image_path(file: &NamedTempFile) -> &str {
    file.path().to_str().unwrap()
}

#[test]
fn save_then_init_round_trips_directory_and_content() {
    let image = NamedTempFile::new().unwrap();

    let mut fs = FileSystem::new();
    fs.init("").unwrap();
    fs.create("a").unwrap();
    fs.create("bc").unwrap();
    let slot = fs.open("a").unwrap();
    fs.write(slot, "x", 5).unwrap();
    let slot = fs.open("bc").unwrap();
    fs.write(slot, "y", 100).unwrap();
    let listing = fs.directory().unwrap();
    fs.save(image_path(&image)).unwrap();

    // A brand-new engine, as after a process restart.
    let mut fs = FileSystem::new();
    fs.init(image_path(&image)).unwrap();
    assert_eq!(fs.directory().unwrap(), listing);

    let slot = fs.open("a").unwrap();
    assert_eq!(fs.read(slot, 5).unwrap(), "xxxxx");
    let slot = fs.open("bc").unwrap();
    assert_eq!(fs.read(slot, 100).unwrap(), "y".repeat(100));
}

#[test]
fn save_unmounts_and_the_same_engine_can_remount() {
    let image = NamedTempFile::new().unwrap();

    let mut fs = FileSystem::new();
    fs.init("").unwrap();
    fs.create("keep").unwrap();
    fs.save(image_path(&image)).unwrap();

    assert!(matches!(fs.directory(), Err(FsError::State(_))));

    fs.init(image_path(&image)).unwrap();
    assert_eq!(fs.directory().unwrap(), ["keep"]);
}

#[test]
fn open_sessions_are_flushed_by_save() {
    let image = NamedTempFile::new().unwrap();

    let mut fs = FileSystem::new();
    fs.init("").unwrap();
    fs.create("f").unwrap();
    let slot = fs.open("f").unwrap();
    fs.write(slot, "z", MAX_FILE_LEN).unwrap();
    // No close before save; the buffered page and length must still land
    // in the image.
    fs.save(image_path(&image)).unwrap();

    fs.init(image_path(&image)).unwrap();
    let slot = fs.open("f").unwrap();
    assert_eq!(fs.read(slot, MAX_FILE_LEN).unwrap(), "z".repeat(MAX_FILE_LEN));
}

#[test]
fn destroyed_files_stay_gone_across_a_round_trip() {
    let image = NamedTempFile::new().unwrap();

    let mut fs = FileSystem::new();
    fs.init("").unwrap();
    fs.create("a").unwrap();
    fs.create("b").unwrap();
    fs.destroy("a").unwrap();
    fs.save(image_path(&image)).unwrap();

    fs.init(image_path(&image)).unwrap();
    assert_eq!(fs.directory().unwrap(), ["b"]);
    assert!(matches!(fs.open("a"), Err(FsError::Validation(_))));
}

#[test]
fn init_fails_for_a_missing_image() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.img");

    let mut fs = FileSystem::new();
    assert!(matches!(
        fs.init(missing.to_str().unwrap()),
        Err(FsError::Io(_))
    ));
    assert!(matches!(fs.directory(), Err(FsError::State(_))));
}

#[test]
fn init_rejects_a_truncated_image() {
    let image = NamedTempFile::new().unwrap();
    std::fs::write(image.path(), [0u8; 10]).unwrap();

    let mut fs = FileSystem::new();
    assert!(matches!(
        fs.init(image_path(&image)),
        Err(FsError::Validation(_))
    ));
    assert!(matches!(fs.directory(), Err(FsError::State(_))));
}

#[test]
fn save_rejects_an_empty_path() {
    let mut fs = FileSystem::new();
    fs.init("").unwrap();
    assert!(matches!(fs.save(""), Err(FsError::Validation(_))));
    // Still mounted after the failure.
    assert!(fs.directory().is_ok());
}

#[test]
fn saved_image_has_the_documented_layout() {
    let image = NamedTempFile::new().unwrap();

    let mut fs = FileSystem::new();
    fs.init("").unwrap();
    fs.create("ab").unwrap();
    fs.save(image_path(&image)).unwrap();

    let raw = std::fs::read(image.path()).unwrap();
    assert_eq!(raw.len(), 64 * 64);

    // Bitmap word 0, big-endian, least significant bit = block 0: the
    // bitmap block, six descriptor blocks and the directory's data block.
    assert_eq!(&raw[0..4], &[0x00, 0x00, 0x00, 0xFF]);
    assert_eq!(&raw[4..8], &[0x00, 0x00, 0x00, 0x00]);

    // Descriptor 0 (the directory): one 8-byte entry, first data block 7,
    // remaining pointers unset (sentinel 1).
    assert_eq!(
        &raw[64..80],
        &[0, 0, 0, 8, 0, 0, 0, 7, 0, 0, 0, 1, 0, 0, 0, 1]
    );
    // Descriptor 1 ("ab"): claimed but empty.
    assert_eq!(
        &raw[80..96],
        &[0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1]
    );
    // Descriptor 2: still the free sentinel in every word.
    assert_eq!(
        &raw[96..112],
        &[0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1]
    );

    // Block 7: the directory entry, name padded with 0xFF.
    assert_eq!(&raw[448..456], &[b'a', b'b', 0xFF, 0xFF, 0, 0, 0, 1]);
}
