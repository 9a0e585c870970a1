use mksservo_lib::{
    client::Servo,
    crc,
    protocol::{AbsoluteMove, Address, IoOutputs, IoStatus},
    transport::Transport,
    Error, Result,
};
use std::collections::VecDeque;
use std::time::Duration;

/// Replays canned answers and records what was written.
#[derive(Default)]
struct ScriptedBus {
    sent: Vec<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
    timeouts: Vec<Duration>,
}

impl ScriptedBus {
    fn answer(mut self, reply: &[u8]) -> Self {
        self.replies.push_back(reply.to_vec());
        self
    }

    fn answer_with_crc(self, payload: &[u8]) -> Self {
        let mut reply = payload.to_vec();
        crc::append(&mut reply);
        self.answer(&reply)
    }
}

impl Transport for ScriptedBus {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn receive(&mut self, expected_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        self.timeouts.push(timeout);
        let mut reply = self.replies.pop_front().unwrap_or_default();
        reply.truncate(expected_len);
        Ok(reply)
    }
}

fn servo(address: u8) -> Servo {
    Servo::new(Address::try_from(address).unwrap())
}

#[test]
fn read_io_over_the_bus() {
    let mut bus = ScriptedBus::default().answer(&[0x01, 0x04, 0x02, 0x00, 0x0B, 0xF8, 0xF7]);
    let io = servo(1).read_io(&mut bus).unwrap();

    assert_eq!(bus.sent, [[0x01, 0x04, 0x00, 0x34, 0x00, 0x01, 0x70, 0x04]]);
    assert_eq!(
        io,
        IoStatus {
            in_1: true,
            in_2: false,
            out_1: true,
            out_2: true,
        }
    );
}

#[test]
fn read_multiple_registers() {
    let mut bus = ScriptedBus::default()
        .answer_with_crc(&[0x05, 0x04, 0x06, 0x00, 0x01, 0x02, 0x03, 0xFF, 0xFE]);
    let words = servo(5).read(&mut bus, 0x30, 3).unwrap();
    assert_eq!(words, [0x0001, 0x0203, 0xFFFE]);
}

#[test]
fn caller_timeout_reaches_the_transport() {
    let mut bus = ScriptedBus::default();
    let servo = servo(1).with_timeout(Duration::from_millis(250));

    assert!(matches!(
        servo.read(&mut bus, 0x34, 1),
        Err(Error::Timeout(..))
    ));
    assert!(matches!(
        servo.read_with_timeout(&mut bus, 0x34, 1, Duration::from_secs(2)),
        Err(Error::Timeout(..))
    ));
    assert_eq!(
        bus.timeouts,
        [Duration::from_millis(250), Duration::from_secs(2)]
    );
}

#[test]
fn short_answer_is_incomplete() {
    let mut bus = ScriptedBus::default().answer(&[0x01, 0x04, 0x02]);
    assert!(matches!(
        servo(1).read_io(&mut bus),
        Err(Error::IncompleteResponse {
            expected: 7,
            actual: 3
        })
    ));
}

#[test]
fn corrupted_answer_is_rejected() {
    let mut bus = ScriptedBus::default().answer(&[0x01, 0x04, 0x02, 0x00, 0x0A, 0xF8, 0xF7]);
    assert!(matches!(
        servo(1).read_io(&mut bus),
        Err(Error::CrcMismatch {
            received: 0xF7F8,
            ..
        })
    ));
}

#[test]
fn no_retry_after_failure() {
    let mut bus = ScriptedBus::default()
        .answer(&[0x01, 0x06, 0x00, 0x80, 0x00, 0x01, 0x00, 0x00])
        .answer(&[0x01, 0x06, 0x00, 0x80, 0x00, 0x01, 0x49, 0xE2]);
    assert!(matches!(
        servo(1).write_single(&mut bus, 0x80, 1),
        Err(Error::CrcMismatch { .. })
    ));
    assert_eq!(bus.sent.len(), 1);
    assert_eq!(bus.replies.len(), 1);
}

#[test]
fn write_single_echo() {
    let mut bus = ScriptedBus::default().answer(&[0x01, 0x06, 0x00, 0x80, 0x00, 0x01, 0x49, 0xE2]);
    servo(1).write_single(&mut bus, 0x80, 1).unwrap();
    assert_eq!(bus.sent, [[0x01, 0x06, 0x00, 0x80, 0x00, 0x01, 0x49, 0xE2]]);
}

#[test]
fn write_io_and_move() {
    let mut bus = ScriptedBus::default()
        .answer(&[0x01, 0x10, 0x00, 0x36, 0x00, 0x02, 0xA1, 0xC6])
        .answer(&[0x01, 0x10, 0x00, 0x90, 0x00, 0x04, 0xC1, 0xE7]);
    let servo = servo(1);

    servo
        .write_io(&mut bus, &IoOutputs::set(false, true))
        .unwrap();
    servo
        .move_absolute(
            &mut bus,
            &AbsoluteMove {
                acceleration: 2,
                speed: 100,
                angle: -1000,
            },
        )
        .unwrap();

    assert_eq!(
        bus.sent[0],
        [0x01, 0x10, 0x00, 0x36, 0x00, 0x02, 0x04, 0x01, 0x01, 0x01, 0x00, 0x21, 0x3D]
    );
    assert_eq!(&bus.sent[1][7..15], [0x00, 0x02, 0x00, 0x64, 0xFF, 0xFF, 0xFC, 0x18]);
}

#[test]
fn invalid_outputs_never_reach_the_bus() {
    let mut bus = ScriptedBus::default();
    let outputs = IoOutputs {
        out1_mask: 1,
        out1: 1,
        out2_mask: 5,
        out2: 0,
    };
    assert!(matches!(
        servo(1).write_io(&mut bus, &outputs),
        Err(Error::InvalidParameter(..))
    ));
    assert!(bus.sent.is_empty());
}

#[test]
fn write_multiple_words() {
    let mut bus = ScriptedBus::default().answer_with_crc(&[0x02, 0x10, 0x00, 0x90, 0x00, 0x02]);
    servo(2)
        .write_multiple(&mut bus, 0x90, &[0x1234, 0xABCD])
        .unwrap();
    assert_eq!(
        &bus.sent[0][..11],
        [0x02, 0x10, 0x00, 0x90, 0x00, 0x02, 0x04, 0x12, 0x34, 0xAB, 0xCD]
    );
}

#[test]
fn two_devices_share_one_link() {
    let mut bus = ScriptedBus::default()
        .answer_with_crc(&[0x01, 0x04, 0x02, 0x00, 0x08])
        .answer_with_crc(&[0x02, 0x04, 0x02, 0x00, 0x01]);

    let first = servo(1).read_io(&mut bus).unwrap();
    let second = servo(2).read_io(&mut bus).unwrap();
    assert!(first.in_1 && !first.out_2);
    assert!(!second.in_1 && second.out_2);
}

#[test]
fn broadcast_write_does_not_wait() {
    let mut bus = ScriptedBus::default();
    servo(0)
        .write_io(&mut bus, &IoOutputs::set(true, true))
        .unwrap();
    assert_eq!(bus.sent.len(), 1);
    assert!(bus.timeouts.is_empty());
}
