//! Network lifecycle tests against the host transport.
//!
//! Everything here runs without hardware: the host transport implements
//! the same buffer/submit primitives as the kernel path, with allocation
//! fault injection for the rollback tests.

use ane_driver::transports::HostTransport;
use ane_driver::{tile, AneDevice, AneError, Model, NetworkInstance, TileShape};

const HEADER_SIZE: usize = 4096;

/// Reference scenario from the driver's test plan: one destination and
/// one source channel of 0x4000 bytes each, 0x8000-byte payload,
/// 0x800-byte task descriptor.
fn scenario_model() -> Model {
    let mut data = vec![0u8; HEADER_SIZE];
    put_u64(&mut data, 0x00, 0x8000); // payload size
    put_u64(&mut data, 0x08, 0x800); // td_size
    put_u32(&mut data, 0x10, 1); // td_count
    put_u32(&mut data, 0x14, 0x800); // tsk_size
    put_u32(&mut data, 0x18, 1); // src_count
    put_u32(&mut data, 0x1c, 1); // dst_count

    put_u32(&mut data, 0x20, 2); // slot 0: 0x8000 weights
    put_u32(&mut data, 0x20 + 4 * 4, 1); // slot 4: dst, 0x4000
    put_u32(&mut data, 0x20 + 5 * 4, 1); // slot 5: src, 0x4000

    // 1x1x16x64 tensors in a 0x4000 page of 0x100 stride.
    for slot in [4usize, 5] {
        let base = 0xa0 + slot * 48;
        for (i, v) in [1u64, 1, 16, 64, 0x4000, 0x100].iter().enumerate() {
            put_u64(&mut data, base + i * 8, *v);
        }
    }

    // Payload with a recognizable first control word and body.
    let mut payload = vec![0u8; 0x8000];
    payload[..4].copy_from_slice(&0xdead_beefu32.to_le_bytes());
    for (i, b) in payload.iter_mut().enumerate().skip(4) {
        *b = (i % 251) as u8;
    }
    data.extend_from_slice(&payload);

    Model::from_bytes(&data).expect("scenario model parses")
}

fn scenario_shape() -> TileShape {
    TileShape {
        n: 1,
        c: 1,
        h: 16,
        w: 64,
        page: 0x4000,
        stride: 0x100,
    }
}

fn bind_scenario(transport: &HostTransport) -> NetworkInstance {
    let device = AneDevice::with_transport(Box::new(transport.clone()));
    NetworkInstance::bind(device, scenario_model()).expect("bind succeeds")
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

#[test]
fn scenario_binds_complete_channel_set() {
    let transport = HostTransport::new();
    let nn = bind_scenario(&transport);

    assert_eq!(nn.src_count(), 1);
    assert_eq!(nn.dst_count(), 1);

    // Weight, dst, src, bootstrap.
    assert_eq!(transport.live_allocations(), 4);

    assert_eq!(nn.src_size(0).unwrap(), 0x4000);
    assert_eq!(nn.dst_size(0).unwrap(), 0x4000);
    assert_eq!(nn.src_chan(0).unwrap().len(), 0x4000);
    assert_eq!(nn.dst_chan(0).unwrap().len(), 0x4000);

    // Bootstrap rounds 0x800 up to one tile.
    assert_eq!(nn.bootstrap_chan().len(), 0x4000);
}

#[test]
fn bind_failure_leaves_zero_channels() {
    // The scenario allocates 4 channels; make each of them the one that
    // fails and verify the set unwinds completely every time.
    for k in 0..4 {
        let transport = HostTransport::with_alloc_limit(k);
        let device = AneDevice::with_transport(Box::new(transport.clone()));

        let err = NetworkInstance::bind(device, scenario_model())
            .err()
            .expect("bind must fail with budget");
        assert!(matches!(err, AneError::Allocation { .. }), "k={k}: {err}");
        assert_eq!(transport.live_allocations(), 0, "leak with budget {k}");
    }
}

#[test]
fn drop_releases_every_channel() {
    let transport = HostTransport::new();
    let nn = bind_scenario(&transport);
    assert_eq!(transport.live_allocations(), 4);

    drop(nn);
    assert_eq!(transport.live_allocations(), 0);
}

#[test]
fn bootstrap_word_carries_nid_and_preserves_other_bits() {
    let transport = HostTransport::new();
    let device = AneDevice::with_transport(Box::new(transport.clone()));
    let model = scenario_model();
    let payload = model.payload().clone();

    let nn = NetworkInstance::bind_with_nid(device, model, 0x40).unwrap();
    let btsp = nn.bootstrap_chan();

    let word = u32::from_le_bytes(btsp[..4].try_into().unwrap());
    // Original word 0xdeadbeef: bits 16-23 (0xad) replaced by the nid,
    // everything else intact.
    assert_eq!((word >> 16) & 0xff, 0x40);
    assert_eq!(word & 0xffff, 0xbeef);
    assert_eq!(word >> 24, 0xde);

    // The rest of the task descriptor is the payload, byte for byte.
    assert_eq!(&btsp[4..0x800], &payload[4..0x800]);
}

#[test]
fn exec_submits_populated_handles_once() {
    let transport = HostTransport::new();
    let mut nn = bind_scenario(&transport);

    nn.exec().expect("host submit succeeds");
    let args = transport.last_submit().expect("submit recorded");

    assert_eq!(args.tsk_size, 0x800);
    assert_eq!(args.td_size, 0x800);
    assert_eq!(args.td_count, 1);
    assert_ne!(args.btsp_handle, 0);

    for slot in 0..32 {
        let populated = matches!(slot, 0 | 4 | 5);
        assert_eq!(
            args.handles[slot] != 0,
            populated,
            "slot {slot} handle mismatch"
        );
    }
}

#[test]
fn raw_send_and_read_copy_whole_tiles() {
    let transport = HostTransport::new();
    let mut nn = bind_scenario(&transport);

    let input: Vec<u8> = (0..0x4000).map(|i| (i % 239) as u8).collect();
    nn.send(&input, 0).unwrap();
    assert_eq!(nn.src_chan(0).unwrap(), &input[..]);

    // Stand in for the device: fill the output channel directly.
    nn.dst_chan_mut(0).unwrap().copy_from_slice(&input);
    let mut out = vec![0u8; 0x4000];
    nn.read(&mut out, 0).unwrap();
    assert_eq!(out, input);
}

#[test]
fn out_of_range_index_is_rejected_before_any_copy() {
    let transport = HostTransport::new();
    let mut nn = bind_scenario(&transport);

    let buf = vec![0u8; 0x4000];
    assert!(matches!(
        nn.send(&buf, 1),
        Err(AneError::InvalidArgument { .. })
    ));

    let mut out = vec![0xaau8; 0x4000];
    assert!(matches!(
        nn.read(&mut out, 7),
        Err(AneError::InvalidArgument { .. })
    ));
    assert!(out.iter().all(|&b| b == 0xaa), "read touched the buffer");

    assert!(nn.src_chan(1).is_err());
    assert!(nn.dst_size(1).is_err());
}

#[test]
fn wrong_length_raw_copy_is_rejected() {
    let transport = HostTransport::new();
    let mut nn = bind_scenario(&transport);

    assert!(nn.send(&[0u8; 16], 0).is_err());
    let mut short = [0u8; 16];
    assert!(nn.read(&mut short, 0).is_err());
}

#[test]
fn tiled_send_stages_exactly_the_tile_transform() {
    let transport = HostTransport::new();
    let mut nn = bind_scenario(&transport);
    let shape = scenario_shape();

    let logical: Vec<u8> = (0..shape.logical_bytes()).map(|i| (i % 253) as u8).collect();
    nn.send_tiled(&logical, 0).unwrap();

    let mut expected = vec![0u8; 0x4000];
    tile(&logical, &mut expected, &shape).unwrap();
    assert_eq!(nn.src_chan(0).unwrap(), &expected[..]);
}

#[test]
fn tiled_read_inverts_a_staged_tile_buffer() {
    let transport = HostTransport::new();
    let mut nn = bind_scenario(&transport);
    let shape = scenario_shape();

    let logical: Vec<u8> = (0..shape.logical_bytes()).map(|i| (i % 241) as u8).collect();
    let mut tiled = vec![0u8; 0x4000];
    tile(&logical, &mut tiled, &shape).unwrap();
    nn.dst_chan_mut(0).unwrap().copy_from_slice(&tiled);

    let mut out = vec![0xffu8; logical.len()];
    nn.read_tiled(&mut out, 0).unwrap();
    assert_eq!(out, logical);

    // And the full loop: send_tiled + device echo + read_tiled.
    nn.send_tiled(&logical, 0).unwrap();
    let echo = nn.src_chan(0).unwrap().to_vec();
    nn.dst_chan_mut(0).unwrap().copy_from_slice(&echo);
    let mut round = vec![0u8; logical.len()];
    nn.read_tiled(&mut round, 0).unwrap();
    assert_eq!(round, logical);
}

#[test]
fn tiled_ops_validate_logical_length() {
    let transport = HostTransport::new();
    let mut nn = bind_scenario(&transport);

    assert!(nn.send_tiled(&[0u8; 8], 0).is_err());
    let mut out = [0u8; 8];
    assert!(nn.read_tiled(&mut out, 0).is_err());
}

#[test]
fn unchecked_copies_match_checked_ones() {
    let transport = HostTransport::new();
    let mut nn = bind_scenario(&transport);

    let input: Vec<u8> = (0..0x4000).map(|i| (i % 229) as u8).collect();
    // SAFETY: index 0 is in range and input covers the full tile size.
    unsafe { nn.send_unchecked(&input, 0) };
    assert_eq!(nn.src_chan(0).unwrap(), &input[..]);

    nn.dst_chan_mut(0).unwrap().copy_from_slice(&input);
    let mut out = vec![0u8; 0x4000];
    // SAFETY: index 0 is in range and out covers the full tile size.
    unsafe { nn.read_unchecked(&mut out, 0) };
    assert_eq!(out, input);
}
