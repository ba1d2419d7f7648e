//! Exercises the full client stack (UDS client over software ISO-TP) against
//! a simulated ECU that speaks raw CAN frames

use std::collections::VecDeque;

use automotive_diag::uds::UdsError;
use uds_stack::{
    channel::{CanChannel, CanFrame, ChannelResult, Packet, PacketChannel},
    isotp::{IsoTpSettings, SoftwareIsoTp},
    uds::{UDSSessionType, UdsClient, UdsClientOptions},
    DiagError,
};

const TESTER_ID: u32 = 0x7E0;
const ECU_ID: u32 = 0x7E8;

/// Simulated ECU at the CAN frame level. Understands single frame requests and
/// answers with whatever UDS payloads the handler returns, segmenting large
/// responses and honouring the client's flow control.
pub struct FrameSimEcu {
    handler: fn(&[u8]) -> Vec<Vec<u8>>,
    rx: VecDeque<CanFrame>,
    gated_cfs: VecDeque<CanFrame>,
}

unsafe impl Send for FrameSimEcu {}
unsafe impl Sync for FrameSimEcu {}

impl FrameSimEcu {
    pub fn new(handler: fn(&[u8]) -> Vec<Vec<u8>>) -> Self {
        Self {
            handler,
            rx: VecDeque::new(),
            gated_cfs: VecDeque::new(),
        }
    }

    fn enqueue_response(&mut self, payload: &[u8]) {
        if payload.len() <= 7 {
            let mut sf = vec![payload.len() as u8];
            sf.extend_from_slice(payload);
            sf.resize(8, 0xCC);
            self.rx.push_back(CanFrame::new(ECU_ID, &sf, false));
            return;
        }
        let mut ff = vec![
            0x10 | ((payload.len() >> 8) as u8 & 0x0F),
            payload.len() as u8,
        ];
        ff.extend_from_slice(&payload[..6]);
        self.rx.push_back(CanFrame::new(ECU_ID, &ff, false));
        let mut seq = 1u8;
        for chunk in payload[6..].chunks(7) {
            let mut cf = vec![0x20 | seq];
            cf.extend_from_slice(chunk);
            cf.resize(8, 0xCC);
            self.gated_cfs.push_back(CanFrame::new(ECU_ID, &cf, false));
            seq = (seq + 1) & 0x0F;
        }
    }
}

impl PacketChannel<CanFrame> for FrameSimEcu {
    fn open(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    fn write_packets(&mut self, packets: Vec<CanFrame>, _timeout_ms: u32) -> ChannelResult<()> {
        for frame in packets {
            let data = frame.get_data().to_vec();
            match data[0] & 0xF0 {
                0x00 => {
                    let len = (data[0] & 0x0F) as usize;
                    let request = data[1..1 + len].to_vec();
                    for response in (self.handler)(&request) {
                        self.enqueue_response(&response);
                    }
                }
                0x30 => {
                    // The client announces BS=0, so release everything at once
                    while let Some(cf) = self.gated_cfs.pop_front() {
                        self.rx.push_back(cf);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn read_packets(&mut self, max: usize, _timeout_ms: u32) -> ChannelResult<Vec<CanFrame>> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.rx.pop_front() {
                Some(f) => out.push(f),
                None => break,
            }
        }
        Ok(out)
    }

    fn clear_rx_buffer(&mut self) -> ChannelResult<()> {
        self.rx.clear();
        self.gated_cfs.clear();
        Ok(())
    }

    fn clear_tx_buffer(&mut self) -> ChannelResult<()> {
        Ok(())
    }
}

impl CanChannel for FrameSimEcu {
    fn set_can_cfg(&mut self, _baud: u32, _use_extended: bool) -> ChannelResult<()> {
        Ok(())
    }
}

fn ecu_handler(request: &[u8]) -> Vec<Vec<u8>> {
    match request {
        // VIN read, answered across several frames
        [0x22, 0xF1, 0x90] => {
            let mut response = vec![0x62, 0xF1, 0x90];
            response.extend_from_slice(b"1HGCM582354567890");
            vec![response]
        }
        // Extended session with timing parameters (P2 = 50ms, P2* = 5000ms)
        [0x10, 0x03] => vec![vec![0x50, 0x03, 0x00, 0x32, 0x01, 0xF4]],
        // Slow identifier: two response-pending frames before the answer
        [0x22, 0xF1, 0x91] => vec![
            vec![0x7F, 0x22, 0x78],
            vec![0x7F, 0x22, 0x78],
            vec![0x62, 0xF1, 0x91, 0x12, 0x34],
        ],
        // Identifier outside the valid range
        [0x22, 0xF1, 0x92] => vec![vec![0x7F, 0x22, 0x31]],
        // Suppressed tester present: ECU stays silent
        [0x3E, 0x80] => vec![],
        [0x3E, 0x00] => vec![vec![0x7E, 0x00]],
        [0x14, 0xFF, 0xFF, 0xFF] => vec![vec![0x54]],
        _ => vec![vec![0x7F, request[0], 0x11]],
    }
}

fn sim_client() -> UdsClient {
    let _ = env_logger::try_init();
    let can = FrameSimEcu::new(ecu_handler);
    let isotp = SoftwareIsoTp::new(Box::new(can));
    UdsClient::new_over_iso_tp(
        UdsClientOptions {
            send_id: TESTER_ID,
            recv_id: ECU_ID,
            ..Default::default()
        },
        Box::new(isotp),
        IsoTpSettings::default(),
    )
    .unwrap()
}

#[test]
fn read_vin_over_multiple_frames() {
    let mut client = sim_client();
    let vin = client.read_data_by_identifier(0xF190).unwrap();
    assert_eq!(vin.len(), 17);
    assert_eq!(vin, b"1HGCM582354567890");
}

#[test]
fn extended_session_reports_timing() {
    let mut client = sim_client();
    let timing = client.set_session_mode(UDSSessionType::Extended).unwrap();
    assert_eq!(timing.p2_server_ms, 50);
    assert_eq!(timing.p2_star_server_ms, 5000);
    assert_eq!(client.current_session_mode(), UDSSessionType::Extended);
}

#[test]
fn pending_frames_extend_the_deadline() {
    let mut client = sim_client();
    let data = client.read_data_by_identifier(0xF191).unwrap();
    assert_eq!(data, vec![0x12, 0x34]);
}

#[test]
fn negative_response_reaches_the_caller() {
    let mut client = sim_client();
    let err = client.read_data_by_identifier(0xF192).unwrap_err();
    assert!(err.is_nrc(UdsError::RequestOutOfRange));
    assert_eq!(err.nrc(), Some(0x31));
}

#[test]
fn suppressed_tester_present_succeeds_without_reply() {
    let mut client = sim_client();
    client.tester_present_suppressed().unwrap();
    // The channel still works for ordinary requests afterwards
    client.tester_present().unwrap();
}

#[test]
fn clear_all_dtcs() {
    let mut client = sim_client();
    client.clear_all_dtcs().unwrap();
}

#[test]
fn unsupported_service_is_rejected() {
    let mut client = sim_client();
    let err = client.ecu_hard_reset().unwrap_err();
    assert!(err.is_nrc(UdsError::ServiceNotSupported));
    match err {
        DiagError::ECUError { code: 0x11, .. } => {}
        other => panic!("expected service not supported, got {other:?}"),
    }
}
