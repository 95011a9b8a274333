//! The physical copy path on a simulated machine.

use pmem_addresses::PhysicalAddress;
use pmem_rogue::{
    CopyError, Direction, HostStatus, MAX_PHYSICAL_ADDRESS, MappingError, RogueConfig,
    RogueMapper, ScratchPageSize, TlbShootdown, copy,
};
use pmem_sim::{SimBuffer, SimMachine};

fn config(page_size: ScratchPageSize) -> RogueConfig {
    RogueConfig::new(page_size, TlbShootdown::LocalOnly)
}

fn read(
    m: &SimMachine,
    page_size: ScratchPageSize,
    offset: i64,
    length: usize,
) -> (Result<u64, CopyError>, SimBuffer<'_>) {
    let mut mapper = RogueMapper::new(m, config(page_size));
    let mut buffer = SimBuffer::zeroed(m, length);
    let result = copy(
        &mut mapper,
        Direction::ToBuffer,
        offset,
        length as u64,
        &mut buffer,
    );
    (result, buffer)
}

#[test]
fn one_aligned_page() {
    pmem_sim::init_logging();
    let m = SimMachine::new();
    m.fill_phys(PhysicalAddress::new(0x1000), 4096, 0xAA);

    let (result, buffer) = read(&m, ScratchPageSize::Regular, 0x1000, 4096);
    assert_eq!(result, Ok(4096));
    assert!(buffer.bytes().iter().all(|&b| b == 0xAA));

    assert_eq!(m.stats().reserves, 1);
    assert_eq!(m.stats().releases, 1);
    assert!(m.released()[0].leaf_restored());
}

#[test]
fn a_range_crossing_a_page_boundary_takes_two_mappings() {
    let m = SimMachine::new();
    m.fill_phys(PhysicalAddress::new(0x0000), 4096, 0x11);
    m.fill_phys(PhysicalAddress::new(0x1000), 4096, 0x22);

    let (result, buffer) = read(&m, ScratchPageSize::Regular, 0x0FF0, 33);
    assert_eq!(result, Ok(33));
    assert_eq!(buffer.transfers(), 2);
    assert_eq!(m.stats().reserves, 2);
    assert_eq!(m.stats().releases, 2);

    let mut expected = vec![0x11; 16];
    expected.extend([0x22; 17]);
    assert_eq!(buffer.bytes(), expected.as_slice());
}

#[test]
fn chunked_copies_match_physical_memory_at_any_alignment() {
    let m = SimMachine::new();
    let pattern: Vec<u8> = (0..0x6000u32).map(|i| (i * 7 + i / 4096) as u8).collect();
    m.write_phys(PhysicalAddress::new(0), &pattern);

    let ranges = [
        (0, 1),
        (0xFFF, 2),
        (0x801, 0x1000),
        (0x1000, 0x3000),
        (0x1FFF, 0x2002),
    ];
    for (offset, length) in ranges {
        let before = m.stats().reserves;
        let (result, buffer) = read(&m, ScratchPageSize::Regular, offset, length);
        assert_eq!(result, Ok(length as u64));
        assert_eq!(buffer.bytes(), &pattern[offset as usize..offset as usize + length]);

        let first_page = offset as usize / 4096;
        let last_page = (offset as usize + length - 1) / 4096;
        assert_eq!(m.stats().reserves - before, last_page - first_page + 1);
    }
    assert_eq!(m.outstanding_scratch_pages(), 0);
    assert!(m.released().iter().all(|r| r.leaf_restored()));
}

#[test]
fn large_mode_chunks_at_2m() {
    let m = SimMachine::new();
    m.fill_phys(PhysicalAddress::new(0x001F_F000), 0x2000, 0x5A);

    let (result, buffer) = read(&m, ScratchPageSize::Large, 0x001F_FFF0, 0x20);
    assert_eq!(result, Ok(0x20));
    assert_eq!(buffer.transfers(), 2);
    assert!(buffer.bytes().iter().all(|&b| b == 0x5A));
    assert!(m.released().iter().all(|r| r.size == ScratchPageSize::Large && r.leaf_restored()));
}

#[test]
fn negative_offsets_are_rejected_before_any_mapping() {
    let m = SimMachine::new();
    let (result, buffer) = read(&m, ScratchPageSize::Regular, -4096, 16);
    assert_eq!(
        result,
        Err(CopyError::InvalidOffset {
            offset: -4096,
            length: 16
        })
    );
    assert_eq!(buffer.transfers(), 0);
    assert_eq!(m.stats(), pmem_sim::SimStats::default());
}

#[test]
fn ranges_past_the_physical_address_space_are_rejected() {
    let m = SimMachine::new();
    let offset = i64::try_from(MAX_PHYSICAL_ADDRESS - 1).unwrap();
    let (result, _) = read(&m, ScratchPageSize::Regular, offset, 2);
    assert!(matches!(result, Err(CopyError::InvalidOffset { .. })));
    assert_eq!(m.stats().reserves, 0);
}

#[test]
fn an_empty_range_maps_nothing() {
    let m = SimMachine::new();
    let (result, _) = read(&m, ScratchPageSize::Regular, 0x1000, 0);
    assert_eq!(result, Ok(0));
    assert_eq!(m.stats().reserves, 0);
}

#[test]
fn a_short_transfer_still_tears_the_mapping_down() {
    let m = SimMachine::new();
    let mut mapper = RogueMapper::new(&m, config(ScratchPageSize::Regular));
    let mut buffer = SimBuffer::zeroed(&m, 0x2000).fail_after(100);

    let result = copy(&mut mapper, Direction::ToBuffer, 0, 0x2000, &mut buffer);
    assert_eq!(
        result,
        Err(CopyError::TransferFailed {
            offset: 0,
            moved: 100,
            expected: 4096
        })
    );
    assert_eq!(m.stats().reserves, 1);
    assert_eq!(m.outstanding_scratch_pages(), 0);
    assert!(m.released()[0].leaf_restored());
    assert!(!mapper.state().is_active());
}

#[test]
fn a_failed_create_stops_the_copy() {
    let m = SimMachine::new();
    m.fail_reserve(1, -12);

    let (result, buffer) = read(&m, ScratchPageSize::Regular, 0, 0x2000);
    assert_eq!(
        result,
        Err(CopyError::Mapping(MappingError::AllocationFailed {
            size: ScratchPageSize::Regular,
            status: HostStatus(-12)
        }))
    );
    assert_eq!(buffer.position(), 4096);
    assert_eq!(m.outstanding_scratch_pages(), 0);
}

#[test]
fn a_failed_destroy_is_not_retried() {
    let m = SimMachine::new();
    m.fail_release(0, 9);

    let (result, _) = read(&m, ScratchPageSize::Regular, 0, 0x2000);
    assert!(matches!(
        result,
        Err(CopyError::Mapping(MappingError::DeallocationFailed {
            status: HostStatus(9),
            ..
        }))
    ));
    assert_eq!(m.stats().reserves, 1);
}

#[test]
fn writes_land_in_physical_memory() {
    let m = SimMachine::new();
    let data: Vec<u8> = (0..=255).collect();
    let mut mapper = RogueMapper::new(&m, config(ScratchPageSize::Regular));
    let mut buffer = SimBuffer::from_bytes(&m, data.clone());

    let result = copy(&mut mapper, Direction::FromBuffer, 0x2F80, 256, &mut buffer);
    assert_eq!(result, Ok(256));
    assert_eq!(m.read_phys(PhysicalAddress::new(0x2F80), 256), data);
    assert!(m.released().iter().all(|r| r.leaf_restored()));
}
