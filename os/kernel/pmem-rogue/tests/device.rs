//! The device entry points, including concurrent callers.

use pmem_addresses::{PhysicalAddress, VirtualAddress};
use pmem_rogue::{DeviceInfo, PmemDevice, Request, RogueConfig, ScratchPageSize, TlbShootdown};
use pmem_sim::{SimBuffer, SimMachine};

#[test]
fn info_reports_the_current_pml4_and_the_configuration() {
    let m = SimMachine::new();
    let config = RogueConfig::new(ScratchPageSize::Large, TlbShootdown::Broadcast);
    let device = PmemDevice::new(&m, config);
    assert_eq!(
        device.info(),
        DeviceInfo {
            dtb: m.root(),
            page_size: ScratchPageSize::Large,
            shootdown: TlbShootdown::Broadcast,
        }
    );
}

#[test]
fn write_then_read_back() {
    let m = SimMachine::new();
    let device = PmemDevice::new(&m, RogueConfig::default());
    let request = Request::new(0x0008_0FFC, 8);

    let mut source = SimBuffer::from_bytes(&m, vec![9, 8, 7, 6, 5, 4, 3, 2]);
    assert_eq!(device.write(&request, &mut source), Ok(8));

    let mut sink = SimBuffer::zeroed(&m, 8);
    assert_eq!(device.read(&request, &mut sink), Ok(8));
    assert_eq!(sink.into_bytes(), [9, 8, 7, 6, 5, 4, 3, 2]);
}

#[test]
fn translate_uses_the_callers_address_space() {
    let m = SimMachine::new();
    m.map_4k(
        VirtualAddress::new(0xFFFF_8000_0010_0000),
        PhysicalAddress::new(0x00AB_C000),
    );
    let device = PmemDevice::new(&m, RogueConfig::default());
    assert_eq!(
        device.translate(VirtualAddress::new(0xFFFF_8000_0010_0042)),
        Ok(PhysicalAddress::new(0x00AB_C042))
    );
}

#[test]
fn concurrent_readers_each_get_their_own_mappings() {
    pmem_sim::init_logging();
    let m = SimMachine::with_cpus(4);
    for i in 0..9u8 {
        m.fill_phys(PhysicalAddress::new(u64::from(i) * 0x1000), 0x1000, i);
    }
    let config = RogueConfig::new(ScratchPageSize::Regular, TlbShootdown::LocalOnly);
    let device = PmemDevice::new(&m, config);

    std::thread::scope(|scope| {
        for worker in 0..4u8 {
            let device = &device;
            let m = &m;
            scope.spawn(move || {
                for round in 0..8u8 {
                    let page = (worker + round) % 8;
                    let request = Request::new(i64::from(page) * 0x1000 + 0x800, 0x1000);
                    let mut buffer = SimBuffer::zeroed(m, 0x1000);
                    assert_eq!(device.read(&request, &mut buffer), Ok(0x1000));

                    let (low, high) = buffer.bytes().split_at(0x800);
                    assert!(low.iter().all(|&b| b == page));
                    assert!(high.iter().all(|&b| b == page + 1));
                }
            });
        }
    });

    assert_eq!(m.outstanding_scratch_pages(), 0);
    assert_eq!(m.stats().reserves, 4 * 8 * 2);
    assert!(m.released().iter().all(|r| r.leaf_restored()));
}
