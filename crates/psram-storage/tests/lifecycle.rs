#![cfg(not(target_arch = "wasm32"))]

//! Boot-to-boot behaviour of a region: fresh mount, re-mount after a soft reset, and forced
//! recreation over bad contents.

use psram_storage::{
    Aperture, BlockDevice, ChecksumMode, HeaderFault, HeaderTracking, MemAperture, PsramError,
    Region, RegionBlockDevice, RegionConfig, RegionStream, HEADER_MAGIC, HEADER_SIZE,
    PRESTO_PSRAM,
};

const LENGTH: u64 = 64 * 1024;

fn body_start() -> usize {
    (PRESTO_PSRAM.size - LENGTH) as usize
}

#[test]
fn fresh_mount_then_soft_reset_preserves_data() {
    let mut dev = RegionBlockDevice::open(
        MemAperture::new(PRESTO_PSRAM).unwrap(),
        RegionConfig::new(LENGTH).with_allow_create(true),
    )
    .unwrap();
    dev.write_blocks(3, b"survives reset", 0).unwrap();
    dev.ioctl(psram_storage::IoctlOp::Sync).unwrap();

    // Soft reset: the aperture keeps its contents; the next boot opens without allow_create.
    let aperture = dev.into_region().into_aperture();
    let mut dev = RegionBlockDevice::open(aperture, RegionConfig::new(LENGTH)).unwrap();

    let mut buf = [0u8; 14];
    dev.read_blocks(3, &mut buf, 0).unwrap();
    assert_eq!(&buf, b"survives reset");
}

#[test]
fn garbage_aperture_refuses_mount_without_allow_create() {
    let mut aperture = MemAperture::new(PRESTO_PSRAM).unwrap();
    aperture.as_bytes_mut().fill(0xE5);

    let err = Region::open(&mut aperture, RegionConfig::new(LENGTH)).unwrap_err();
    assert!(matches!(
        err,
        PsramError::UntrustedRegion {
            fault: HeaderFault::BadMagic
        }
    ));
    assert!(aperture.as_bytes().iter().all(|b| *b == 0xE5));
}

#[test]
fn forced_recreate_wipes_corrupted_region() {
    let mut region = Region::open(
        MemAperture::new(PRESTO_PSRAM).unwrap(),
        RegionConfig::tmpfs(LENGTH),
    )
    .unwrap();
    region.write_at(0, &[0x77; 512]).unwrap();
    let mut aperture = region.into_aperture();
    aperture.as_bytes_mut()[body_start() + 100] = 0;

    assert!(Region::open(&mut aperture, RegionConfig::new(LENGTH)).is_err());

    let region = Region::open(aperture, RegionConfig::tmpfs(LENGTH)).unwrap();
    assert!(region.body().iter().all(|b| *b == 0));
    assert!(region.is_valid());
}

#[test]
fn header_is_stored_immediately_before_body() {
    let region = Region::open(
        MemAperture::new(PRESTO_PSRAM).unwrap(),
        RegionConfig::tmpfs(LENGTH),
    )
    .unwrap();
    let raw = region.aperture().as_bytes();
    let slot = &raw[body_start() - HEADER_SIZE..body_start()];
    assert_eq!(&slot[..10], &HEADER_MAGIC);
    assert_eq!(&slot[10..14], &(LENGTH as u32).to_le_bytes());
    assert_eq!(&slot[14..16], &0u16.to_le_bytes());
}

#[test]
fn skip_checksum_mode_survives_body_corruption_but_not_header_damage() {
    let config = RegionConfig::tmpfs(LENGTH).with_checksum(ChecksumMode::Skip);
    let mut region = Region::open(MemAperture::new(PRESTO_PSRAM).unwrap(), config.clone()).unwrap();
    region.write_at(0, b"kept").unwrap();
    let mut aperture = region.into_aperture();

    aperture.as_bytes_mut()[body_start() + 4000] = 0x42;
    let region = Region::open(&mut aperture, config.clone().with_allow_create(false)).unwrap();
    assert_eq!(region.read(0, 4).unwrap(), b"kept");
    drop(region);

    // Magic damage is still caught.
    aperture.as_bytes_mut()[body_start() - HEADER_SIZE] = b'X';
    let err = Region::open(&mut aperture, config.with_allow_create(false)).unwrap_err();
    assert!(matches!(
        err,
        PsramError::UntrustedRegion {
            fault: HeaderFault::BadMagic
        }
    ));
}

#[test]
fn stream_and_block_views_share_one_region_sequentially() {
    let region = Region::open(
        MemAperture::new(PRESTO_PSRAM).unwrap(),
        RegionConfig::tmpfs(LENGTH),
    )
    .unwrap();

    let mut stream = RegionStream::new(region);
    stream.write(b"line one\nline two\n").unwrap();
    let region = stream.into_region();
    assert!(region.is_valid());

    let mut dev = RegionBlockDevice::new(region);
    let mut buf = [0u8; 9];
    dev.read_blocks(0, &mut buf, 9).unwrap();
    assert_eq!(&buf, b"line two\n");
}

#[test]
fn untracked_region_accepts_existing_contents() {
    let mut aperture = MemAperture::new(PRESTO_PSRAM).unwrap();
    aperture.as_bytes_mut()[body_start()..body_start() + 4].copy_from_slice(b"keep");

    let config = RegionConfig::new(LENGTH).with_tracking(HeaderTracking::Untracked);
    let mut dev = RegionBlockDevice::open(&mut aperture, config).unwrap();
    let mut buf = [0u8; 4];
    dev.read_blocks(0, &mut buf, 0).unwrap();
    assert_eq!(&buf, b"keep");
    dev.write_blocks(0, b"new!", 0).unwrap();
    drop(dev);

    // No header was written in front of the body.
    let slot = &aperture.as_bytes()[body_start() - HEADER_SIZE..body_start()];
    assert!(slot.iter().all(|b| *b == 0));
}
