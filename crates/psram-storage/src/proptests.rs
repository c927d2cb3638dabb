use crate::{
    crc16, Aperture, ApertureLayout, BlockDevice, ChecksumMode, ConfigError, HeaderFault, MemAperture,
    PsramError, Region, RegionBlockDevice, RegionConfig, HEADER_MAGIC,
};
use proptest::prelude::*;

const APERTURE_SIZE: u64 = 256 * 1024;

fn layout() -> ApertureLayout {
    ApertureLayout {
        base: 0x1100_0000,
        size: APERTURE_SIZE,
    }
}

fn block_size_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![
        Just(1u32),
        Just(64u32),
        Just(256u32),
        Just(512u32),
        Just(4096u32),
        1u32..=1000,
    ]
}

/// `(length, block_size)` pairs that fit in the test aperture with room for a header.
fn aligned_geometry_strategy() -> impl Strategy<Value = (u64, u32)> {
    block_size_strategy().prop_flat_map(|block_size| {
        let max_blocks = (APERTURE_SIZE - 16) / block_size as u64;
        (0u64..=max_blocks.min(512)).prop_map(move |blocks| (blocks * block_size as u64, block_size))
    })
}

fn unaligned_geometry_strategy() -> impl Strategy<Value = (u64, u32)> {
    (2u32..=4096)
        .prop_flat_map(|block_size| {
            (Just(block_size), 0u64..64, 1u64..block_size as u64)
        })
        .prop_map(|(block_size, blocks, rem)| (blocks * block_size as u64 + rem, block_size))
}

fn device_strategy() -> impl Strategy<Value = (u32, u32)> {
    // (block_size, block_count)
    (prop_oneof![Just(128u32), Just(256u32), Just(512u32)], 1u32..=64)
}

fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(31).wrapping_add(seed as u32) as u8)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_aligned_geometry_opens((length, block_size) in aligned_geometry_strategy()) {
        let config = RegionConfig::tmpfs(length).with_block_size(block_size);
        let region = Region::open(MemAperture::new(layout()).unwrap(), config).unwrap();
        prop_assert_eq!(region.block_count() as u64, length / block_size as u64);
        prop_assert_eq!(region.offset(), APERTURE_SIZE - length);
        prop_assert!(region.is_valid());
    }

    #[test]
    fn prop_unaligned_geometry_fails_untouched((length, block_size) in unaligned_geometry_strategy(), fill in any::<u8>()) {
        let mut ap = MemAperture::new(layout()).unwrap();
        ap.as_bytes_mut().fill(fill);
        let before = ap.as_bytes().to_vec();

        let config = RegionConfig::tmpfs(length).with_block_size(block_size);
        let err = Region::open(&mut ap, config).unwrap_err();
        let is_unaligned = matches!(err, PsramError::Config(ConfigError::UnalignedLength { .. }));
        prop_assert!(is_unaligned);
        prop_assert_eq!(ap.into_vec(), before);
    }

    #[test]
    fn prop_block_round_trip((block_size, block_count) in device_strategy(), seed in any::<u8>()) {
        let length = block_size as u64 * block_count as u64;
        let mut dev = RegionBlockDevice::open(
            MemAperture::new(layout()).unwrap(),
            RegionConfig::tmpfs(length).with_block_size(block_size),
        )
        .unwrap();

        for block in 0..block_count {
            let data = patterned(block_size as usize, seed.wrapping_add(block as u8));
            dev.write_blocks(block, &data, 0).unwrap();
        }
        for block in 0..block_count {
            let mut buf = vec![0u8; block_size as usize];
            dev.read_blocks(block, &mut buf, 0).unwrap();
            prop_assert_eq!(buf, patterned(block_size as usize, seed.wrapping_add(block as u8)));
        }
        prop_assert!(dev.region().is_valid());
    }

    #[test]
    fn prop_header_round_trip(body in prop::collection::vec(any::<u8>(), 1..=8)) {
        // Scale a short random pattern up to a whole number of blocks.
        let length = 1024u64;
        let mut region = Region::open(
            MemAperture::new(layout()).unwrap(),
            RegionConfig::tmpfs(length),
        )
        .unwrap();
        let data: Vec<u8> = body.iter().copied().cycle().take(length as usize).collect();
        region.write_at(0, &data).unwrap();

        region.write_header();
        let header = region.read_header().unwrap();
        prop_assert_eq!(header.magic, HEADER_MAGIC);
        prop_assert_eq!(header.length, length as u32);
        prop_assert_eq!(header.checksum, crc16(&data));
        prop_assert_eq!(region.read_header().unwrap(), header);
        prop_assert!(region.is_valid());
    }

    #[test]
    fn prop_tamper_detection(offset in 0usize..2048, bit in 0u8..8, skip in any::<bool>()) {
        let mode = if skip { ChecksumMode::Skip } else { ChecksumMode::Verify };
        let config = RegionConfig::tmpfs(2048).with_checksum(mode);
        let mut region = Region::open(MemAperture::new(layout()).unwrap(), config.clone()).unwrap();
        region.write_at(0, &patterned(2048, 7)).unwrap();
        prop_assert!(region.is_valid());

        let mut ap = region.into_aperture();
        let body_start = (APERTURE_SIZE - 2048) as usize;
        ap.as_bytes_mut()[body_start + offset] ^= 1 << bit;

        let result = Region::open(ap, config.with_allow_create(false));
        if skip {
            prop_assert!(result.unwrap().is_valid());
        } else {
            let fault = match result {
                Err(PsramError::UntrustedRegion { fault }) => fault,
                other => return Err(TestCaseError::fail(format!("expected untrusted, got {other:?}"))),
            };
            let is_checksum = matches!(fault, HeaderFault::ChecksumMismatch { .. });
            prop_assert!(is_checksum);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 1000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_single_bit_flip_changes_checksum(
        data in prop::collection::vec(any::<u8>(), 1..=512),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let before = crc16(&data);
        prop_assert_eq!(crc16(&data), before);

        let mut flipped = data.clone();
        let i = index.index(flipped.len());
        flipped[i] ^= 1 << bit;
        prop_assert_ne!(crc16(&flipped), before);
    }
}
