use super::Msg;

#[test]
fn test_from_u32() {
    let mut buf = [0u8; 4];
    let x: u32 = 42;
    super::u32_to_u8s(&mut buf, x);
    assert_eq!(buf, [0x2A, 0, 0, 0]);
}

#[test]
fn test_from_u64() {
    let mut buf = [0u8; 8];
    let x: u64 = 42;
    super::u64_to_u8s(&mut buf, x);
    assert_eq!(buf, [0x2A, 0, 0, 0, 0, 0, 0, 0]);

    let x: u64 = 42424242;
    super::u64_to_u8s(&mut buf, x);
    assert_eq!(buf, [0xB2, 0x57, 0x87, 0x02, 0, 0, 0, 0]);
}

#[test]
fn test_to_u32() {
    let buf = vec![0x2A, 0, 0, 0];
    let x = super::u32_from_u8s(&buf[..]);
    assert_eq!(x, 42);

    let buf = vec![0x42, 0, 0x42, 0];
    let x = super::u32_from_u8s(&buf[..]);
    assert_eq!(x, 4325442);
}

#[test]
fn test_to_u64() {
    let buf = vec![0, 0x42, 0, 0x42, 0, 0x42, 0, 0x42];
    let x = super::u64_from_u8s(&buf[..]);
    assert_eq!(x, 4755873775377990144);
}

/// Encode `$m`, decode it, check the decoded message matches, and check that
/// re-encoding the decoded message reproduces the original frame.
macro_rules! check_msg {
    ($id: ident, $typ: ty, $m: expr, $got: pat, $x: ident) => {
        #[test]
        fn $id() {
            let m: $typ = $m;
            let buf: Vec<u8> = crate::serialize::serialize(&m);
            let (msg, consumed) =
                crate::serialize::Msg::from_buf(&buf[..]).expect("deserialize");
            assert_eq!(consumed, buf.len());
            assert_eq!(msg.serialize(), buf);
            match msg {
                $got => assert_eq!($x, m),
                _ => panic!("wrong type for message"),
            }
        }
    };
}

#[test]
fn test_other_msg() {
    use super::other;
    let m = other::Msg::new(0xff, 3, b"hello, world".to_vec()).expect("build msg");
    let buf = super::serialize(&m);
    let (msg, _) = Msg::from_buf(&buf[..]).expect("deserialize");
    match msg {
        Msg::Other(ref raw) => {
            assert_eq!(raw.typ, 0xff);
            assert_eq!(raw.sid, 3);
            assert_eq!(raw.get_raw_bytes(), b"hello, world");
        }
        _ => panic!("wrong type for message"),
    }
    assert_eq!(msg.serialize(), buf);
}

#[test]
fn test_other_msg_too_long() {
    use super::other;
    let body = vec![0u8; super::MAX_MSG_LEN - usize::from(super::HDR_LENGTH)];
    assert!(other::Msg::new(0xff, 1, body.clone()).is_ok());

    let mut body = body;
    body.push(0);
    match other::Msg::new(0xff, 1, body) {
        Err(crate::Error::MalformedFrame(_)) => (),
        x => panic!("expected malformed frame, got {:?}", x),
    }
}

#[test]
fn test_short_header() {
    match Msg::from_buf(&[0u8, 0, 8]) {
        Err(crate::Error::MalformedFrame(_)) => (),
        x => panic!("expected malformed frame, got {:?}", x),
    }
}

#[test]
fn test_truncated_frame() {
    let buf = super::serialize(&super::cwnd::Msg { sid: 1, cwnd: 10 });
    match Msg::from_buf(&buf[..buf.len() - 1]) {
        Err(crate::Error::MalformedFrame(_)) => (),
        x => panic!("expected malformed frame, got {:?}", x),
    }
}

#[test]
fn test_two_frames_in_one_buffer() {
    let mut buf = super::serialize(&super::teardown::Msg { sid: 1 });
    buf.extend(super::serialize(&super::cwnd::Msg { sid: 2, cwnd: 20 }));
    let (first, n) = Msg::from_buf(&buf[..]).expect("first");
    assert_eq!(first, Msg::Td(super::teardown::Msg { sid: 1 }));
    let (second, m) = Msg::from_buf(&buf[n..]).expect("second");
    assert_eq!(second, Msg::Cw(super::cwnd::Msg { sid: 2, cwnd: 20 }));
    assert_eq!(n + m, buf.len());
}
