//! Virtual to physical translation on a simulated machine.

use pmem_addresses::{PhysicalAddress, VirtualAddress};
use pmem_paging::{PagingLevel, PagingReader, WalkError};
use pmem_sim::SimMachine;

#[test]
fn regular_pages_keep_the_12_bit_offset() {
    let m = SimMachine::new();
    m.map_4k(
        VirtualAddress::new(0xFFFF_8000_0000_3000),
        PhysicalAddress::new(0x0012_3000),
    );
    let r = PagingReader::new(&m);
    assert_eq!(
        r.translate(VirtualAddress::new(0xFFFF_8000_0000_3ABC)),
        Ok(PhysicalAddress::new(0x0012_3ABC))
    );
}

#[test]
fn large_pages_fall_back_to_the_pde_with_a_21_bit_offset() {
    let m = SimMachine::new();
    m.map_2m(
        VirtualAddress::new(0xFFFF_8000_0060_0000),
        PhysicalAddress::new(0x0140_0000),
    );
    let r = PagingReader::new(&m);
    let va = VirtualAddress::new(0xFFFF_8000_0071_2345);

    assert!(matches!(
        r.read_pte(va),
        Err(WalkError::LargePageMismatch { .. })
    ));
    assert_eq!(r.translate(va), Ok(PhysicalAddress::new(0x0151_2345)));
}

#[test]
fn unmapped_addresses_surface_the_walk_error_unchanged() {
    let m = SimMachine::new();
    let r = PagingReader::new(&m);
    let va = VirtualAddress::new(0xFFFF_9000_0000_0000);
    assert_eq!(
        r.translate(va),
        Err(WalkError::NotPresent {
            level: PagingLevel::Pml4,
            va
        })
    );
}

#[test]
fn a_non_present_pte_is_not_translated() {
    let m = SimMachine::new();
    // Builds the tables down to the PT, then clears the leaf.
    let leaf = m.map_4k(
        VirtualAddress::new(0xFFFF_8000_0000_5000),
        PhysicalAddress::new(0x5000),
    );
    m.write_phys(leaf, &[0; 8]);

    let r = PagingReader::new(&m);
    let va = VirtualAddress::new(0xFFFF_8000_0000_5010);
    assert_eq!(
        r.translate(va),
        Err(WalkError::NotPresent {
            level: PagingLevel::Pt,
            va
        })
    );
}

#[test]
fn one_gib_pages_are_reported_not_resolved() {
    let m = SimMachine::new();
    m.map_1g(
        VirtualAddress::new(0xFFFF_8000_4000_0000),
        PhysicalAddress::new(0x4000_0000),
    );
    let r = PagingReader::new(&m);
    let err = r
        .translate(VirtualAddress::new(0xFFFF_8000_4000_1000))
        .unwrap_err();
    assert_eq!(err.level(), PagingLevel::Pdpt);
}
