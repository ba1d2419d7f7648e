//! Loopback tests joining two software ISO-TP endpoints with an in-memory
//! CAN channel pair

use std::{
    sync::{mpsc, Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use uds_stack::{
    channel::{
        CanChannel, CanFrame, ChannelResult, IsoTPChannel, Packet, PacketChannel, PayloadChannel,
    },
    isotp::{IsoTpSettings, SoftwareIsoTp},
};

pub struct EmuCanChannel {
    name: &'static str,
    in_queue: mpsc::Receiver<CanFrame>,
    out_queue: mpsc::Sender<CanFrame>,
    /// Records every frame read off the wire, for assertions
    tap: Arc<Mutex<Vec<CanFrame>>>,
}

unsafe impl Send for EmuCanChannel {}
unsafe impl Sync for EmuCanChannel {}

impl EmuCanChannel {
    pub fn new(
        sender: mpsc::Sender<CanFrame>,
        receiver: mpsc::Receiver<CanFrame>,
        name: &'static str,
    ) -> Self {
        Self {
            name,
            in_queue: receiver,
            out_queue: sender,
            tap: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn tap(&self) -> Arc<Mutex<Vec<CanFrame>>> {
        self.tap.clone()
    }
}

impl PacketChannel<CanFrame> for EmuCanChannel {
    fn open(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    fn write_packets(&mut self, packets: Vec<CanFrame>, _timeout_ms: u32) -> ChannelResult<()> {
        for p in packets {
            log::debug!("{} Out -> {p:02X?}", self.name);
            self.out_queue.send(p).unwrap();
        }
        Ok(())
    }

    fn read_packets(&mut self, max: usize, timeout_ms: u32) -> ChannelResult<Vec<CanFrame>> {
        let start = Instant::now();
        let mut read_packets = Vec::new();
        loop {
            if let Ok(f) = self.in_queue.try_recv() {
                log::debug!("{} In  -> {f:02X?}", self.name);
                self.tap.lock().unwrap().push(f);
                read_packets.push(f);
            }
            if read_packets.len() >= max {
                return Ok(read_packets);
            }
            if start.elapsed().as_millis() > timeout_ms as u128 {
                return Ok(read_packets);
            }
        }
    }

    fn clear_rx_buffer(&mut self) -> ChannelResult<()> {
        while self.in_queue.try_recv().is_ok() {}
        Ok(())
    }

    fn clear_tx_buffer(&mut self) -> ChannelResult<()> {
        Ok(())
    }
}

impl CanChannel for EmuCanChannel {
    fn set_can_cfg(&mut self, _baud: u32, _use_extended: bool) -> ChannelResult<()> {
        Ok(())
    }
}

fn endpoint(
    channel: EmuCanChannel,
    cfg: IsoTpSettings,
    tx_id: u32,
    rx_id: u32,
) -> (SoftwareIsoTp, Arc<Mutex<Vec<CanFrame>>>) {
    let tap = channel.tap();
    let mut tp = SoftwareIsoTp::new(Box::new(channel));
    tp.set_iso_tp_cfg(cfg).unwrap();
    tp.set_ids(tx_id, rx_id).unwrap();
    tp.open().unwrap();
    (tp, tap)
}

fn setup(
    tester_cfg: IsoTpSettings,
    ecu_cfg: IsoTpSettings,
) -> (
    SoftwareIsoTp,
    SoftwareIsoTp,
    Arc<Mutex<Vec<CanFrame>>>,
    Arc<Mutex<Vec<CanFrame>>>,
) {
    let (tester_tx, ecu_rx) = mpsc::channel::<CanFrame>();
    let (ecu_tx, tester_rx) = mpsc::channel::<CanFrame>();
    let tester_can = EmuCanChannel::new(tester_tx, tester_rx, "Tester");
    let ecu_can = EmuCanChannel::new(ecu_tx, ecu_rx, "ECU");
    let (tester, tester_tap) = endpoint(tester_can, tester_cfg, 0x7E0, 0x7E8);
    let (ecu, ecu_tap) = endpoint(ecu_can, ecu_cfg, 0x7E8, 0x7E0);
    (tester, ecu, tester_tap, ecu_tap)
}

/// Runs the ECU side receive in a thread so both ends of the handshake make progress
fn recv_in_thread(
    mut ecu: SoftwareIsoTp,
    timeout_ms: u32,
) -> mpsc::Receiver<ChannelResult<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let res = ecu.read_bytes(timeout_ms);
        tx.send(res).unwrap();
    });
    rx
}

#[test]
fn single_frame_roundtrip() {
    let _ = env_logger::try_init();
    let tx_bytes = [0x01, 0x02, 0x03, 0x04, 0x05];
    let (mut tester, mut ecu, _, _) = setup(IsoTpSettings::default(), IsoTpSettings::default());

    tester.write_bytes(0x7E0, &tx_bytes, 0).expect("Write failed!");
    let r = ecu.read_bytes(1000);
    assert!(r.is_ok());
    assert_eq!(tx_bytes.to_vec(), r.unwrap());
}

#[test]
fn multi_frame_roundtrip_no_block_size() {
    let _ = env_logger::try_init();
    let tx_bytes = (0..=0xFFu32).map(|x| x as u8).collect::<Vec<u8>>();
    let (mut tester, ecu, _, _) = setup(IsoTpSettings::default(), IsoTpSettings::default());

    let result = recv_in_thread(ecu, 5000);
    tester
        .write_bytes(0x7E0, &tx_bytes, 5000)
        .expect("Write failed!");
    let r = result.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(tx_bytes, r.unwrap());
}

#[test]
fn multi_frame_roundtrip_with_block_size_and_stmin() {
    let _ = env_logger::try_init();
    let tx_bytes = (0..64u32).map(|x| x as u8).collect::<Vec<u8>>();
    let ecu_cfg = IsoTpSettings {
        block_size: 2,
        st_min: 2,
        ..Default::default()
    };
    let (mut tester, ecu, _, _) = setup(IsoTpSettings::default(), ecu_cfg);

    let result = recv_in_thread(ecu, 5000);
    tester
        .write_bytes(0x7E0, &tx_bytes, 5000)
        .expect("Write failed!");
    let r = result.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(tx_bytes, r.unwrap());
}

#[test]
fn flow_control_count_matches_block_layout() {
    let _ = env_logger::try_init();
    // 100 byte payload, receiver block size 4:
    // 94 bytes ride in consecutive frames, 7 per frame, 4 frames per block,
    // so the receiver owes ceil(94 / 28) = 4 flow control frames
    let tx_bytes = (0..100u32).map(|x| x as u8).collect::<Vec<u8>>();
    let ecu_cfg = IsoTpSettings {
        block_size: 4,
        ..Default::default()
    };
    let (mut tester, ecu, tester_tap, _) = setup(IsoTpSettings::default(), ecu_cfg);

    let result = recv_in_thread(ecu, 5000);
    tester
        .write_bytes(0x7E0, &tx_bytes, 5000)
        .expect("Write failed!");
    let r = result.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(tx_bytes, r.unwrap());

    let fc_count = tester_tap
        .lock()
        .unwrap()
        .iter()
        .filter(|f| f.get_data()[0] & 0xF0 == 0x30)
        .count();
    assert_eq!(fc_count, 4);
}

#[test]
fn long_payload_wraps_sequence_numbers() {
    let _ = env_logger::try_init();
    let tx_bytes = (0..300u32).map(|x| (x % 251) as u8).collect::<Vec<u8>>();
    let (mut tester, ecu, _, ecu_tap) = setup(IsoTpSettings::default(), IsoTpSettings::default());

    let result = recv_in_thread(ecu, 5000);
    tester
        .write_bytes(0x7E0, &tx_bytes, 5000)
        .expect("Write failed!");
    let r = result.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(tx_bytes, r.unwrap());

    // 300 bytes = FF(6) + 42 CFs; sequence numbers must wrap 0x2F -> 0x20
    let seqs: Vec<u8> = ecu_tap
        .lock()
        .unwrap()
        .iter()
        .filter(|f| f.get_data()[0] & 0xF0 == 0x20)
        .map(|f| f.get_data()[0] & 0x0F)
        .collect();
    assert_eq!(seqs.len(), 42);
    assert_eq!(seqs[14], 15);
    assert_eq!(seqs[15], 0);
    assert_eq!(seqs[16], 1);
}

#[test]
fn request_response_exchange() {
    let _ = env_logger::try_init();
    let request = [0x22, 0xF1, 0x90];
    let response: Vec<u8> = {
        let mut r = vec![0x62, 0xF1, 0x90];
        r.extend_from_slice(b"1HGCM582354567890");
        r
    };
    let (mut tester, ecu, _, _) = setup(IsoTpSettings::default(), IsoTpSettings::default());

    let response_c = response.clone();
    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let mut ecu = ecu;
        let req = ecu.read_bytes(5000).unwrap();
        ecu.write_bytes(0x7E8, &response_c, 5000).unwrap();
        done_tx.send(req).unwrap();
    });

    tester.write_bytes(0x7E0, &request, 0).expect("Write failed!");
    let reply = tester.read_bytes(5000).expect("no response");
    assert_eq!(reply, response);
    assert_eq!(
        done_rx.recv_timeout(Duration::from_secs(10)).unwrap(),
        request.to_vec()
    );
}
