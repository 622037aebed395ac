use crate::dynamic::{conforming, BoxedAlg, BoxedFlow};
use crate::interface::{ClassSpec, FLOW_BASE};
use crate::ipc::test::FakeIpc;
use crate::ipc::BackendBuilder;
use crate::serialize::{create, measure, teardown, Msg};
use crate::test_helper::{CountingAlg, CountingFlow};
use crate::{serialize, start, Config, Error, InterfaceError, RunBuilder};

fn counting_flow(init_cwnd: u32, mss: u32) -> BoxedFlow {
    Box::new(CountingFlow::new(init_cwnd, mss))
}

fn frames() -> Vec<Vec<u8>> {
    vec![
        serialize::serialize(&create::Msg {
            sid: 42,
            init_cwnd: 14480,
            mss: 1448,
            src_ip: 0x0a00_0001,
            src_port: 5000,
            dst_ip: 0x0a00_0002,
            dst_port: 80,
        }),
        serialize::serialize(&measure::Msg {
            sid: 42,
            acked: 1448,
            sacked: 0,
            loss: 0,
            rtt: 10_000,
            inflight: 10,
            was_timeout: false,
        }),
        serialize::serialize(&teardown::Msg { sid: 42 }),
    ]
}

#[test]
fn test_ser_over_ipc() {
    let sk = FakeIpc::new(frames());
    let sent = sk.sent.clone();
    let stats = RunBuilder::new(BackendBuilder { sock: sk }, CountingAlg::default())
        .run()
        .expect("channel close is a clean exit");

    assert_eq!(stats.messages, 3);
    assert_eq!(stats.flows_created, 1);
    assert_eq!(stats.flows_removed, 1);
    assert_eq!(stats.instructions_sent, 1);

    let out = sent.lock().unwrap();
    let (got, consumed) = Msg::from_buf(&out[..]).expect("deserialize");
    assert_eq!(consumed, out.len());
    match got {
        Msg::Cw(cw) => {
            assert_eq!(cw.sid, 42);
            assert_eq!(cw.cwnd, 14480 + 1448);
        }
        x => panic!("expected a window update, got {:?}", x),
    }
}

#[test]
fn bad_plugin_is_rejected_before_ipc() {
    let alg = conforming("Plugin", counting_flow).with_flow_class(
        ClassSpec::conforming("PluginFlow", &FLOW_BASE).without("reset"),
    );

    // no socket is opened: the ipc name is never looked at
    match start("no-such-ipc", alg, Config::default()) {
        Err(Error::Interface(InterfaceError::MissingMethod { class, method })) => {
            assert_eq!(class, "PluginFlow");
            assert_eq!(method, "reset");
        }
        x => panic!("expected interface error, got {:?}", x),
    }
}

#[test]
fn bad_plugin_never_reaches_the_loop() {
    let sk = FakeIpc::new(frames());
    let sent = sk.sent.clone();
    let alg = BoxedAlg::new(
        ClassSpec::new("Plugin")
            .subclass_of("AlgBase")
            .method("new_flow", &["self", "init_cwnd"]),
        counting_flow,
    );

    let res = RunBuilder::new(BackendBuilder { sock: sk }, alg).run();
    assert!(matches!(
        res,
        Err(Error::Interface(InterfaceError::SignatureMismatch { .. }))
    ));
    assert!(sent.lock().unwrap().is_empty());
}

#[test]
fn unknown_ipc_is_a_config_error() {
    assert!(matches!(
        start("carrier-pigeon", CountingAlg::default(), Config::default()),
        Err(Error::Config(_))
    ));
}
