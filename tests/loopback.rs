//! End-to-end transfers against a pseudo-terminal
//!
//! The channel opens the pty slave like any other serial device; the test
//! plays the board on the master side.

#![cfg(target_os = "linux")]

use std::ffi::CStr;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{FromRawFd, OwnedFd};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use uart_link::{FrameLayout, LineConfig, ReadPolicy, SerialChannel, SerialError};

const WAIT: Duration = Duration::from_secs(2);

struct Pty {
    master: File,
    slave: PathBuf,
}

fn open_pty() -> Pty {
    unsafe {
        let fd = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
        assert!(fd >= 0, "posix_openpt failed");
        let master = File::from(OwnedFd::from_raw_fd(fd));

        assert_eq!(libc::grantpt(fd), 0);
        assert_eq!(libc::unlockpt(fd), 0);

        let flags = libc::fcntl(fd, libc::F_GETFL);
        assert_eq!(libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK), 0);

        let mut name = [0 as libc::c_char; 128];
        assert_eq!(libc::ptsname_r(fd, name.as_mut_ptr(), name.len()), 0);
        let slave = CStr::from_ptr(name.as_ptr()).to_string_lossy().into_owned();

        Pty {
            master,
            slave: PathBuf::from(slave),
        }
    }
}

/// Read exactly `n` bytes from the master side, or whatever arrived in time
fn read_master(master: &mut File, n: usize) -> Vec<u8> {
    let deadline = Instant::now() + WAIT;
    let mut out = Vec::new();
    let mut buf = vec![0u8; n.max(1)];

    while out.len() < n && Instant::now() < deadline {
        match master.read(&mut buf[..n - out.len()]) {
            Ok(k) => out.extend_from_slice(&buf[..k]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(Duration::from_millis(1)),
            Err(e) => panic!("master read failed: {e}"),
        }
    }
    out
}

fn assert_nothing_sent(master: &mut File) {
    thread::sleep(Duration::from_millis(20));
    let mut buf = [0u8; 8];
    let err = master.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WouldBlock);
}

/// Answer one request of `request_len` bytes with `reply`
fn spawn_peer(pty: &Pty, request_len: usize, reply: Vec<u8>) -> thread::JoinHandle<Vec<u8>> {
    let mut master = pty.master.try_clone().unwrap();
    thread::spawn(move || {
        let request = read_master(&mut master, request_len);
        master.write_all(&reply).unwrap();
        request
    })
}

#[test]
fn test_write_then_read_back() {
    let mut pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, 255).unwrap();

    let written = channel.write_without_feedback(&[0x01, 0x02, 0x03], 3).unwrap();
    assert_eq!(written, 3);
    assert_eq!(channel.last_len(), 3);

    let request = read_master(&mut pty.master, 3);
    assert_eq!(request, vec![0x01, 0x02, 0x03]);
    pty.master.write_all(&request).unwrap();

    // Non-blocking reads may come back empty until the bytes land
    let deadline = Instant::now() + WAIT;
    let mut reply = [0u8; 3];
    let mut got = 0;
    while got < 3 && Instant::now() < deadline {
        got += channel.read_raw(&mut reply[got..], 3 - got).unwrap();
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(got, 3);
    assert_eq!(reply, [0x01, 0x02, 0x03]);
    channel.close().unwrap();
}

#[test]
fn test_read_raw_without_data() {
    let pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, 255).unwrap();

    let mut out = [0u8; 8];
    let start = Instant::now();
    assert_eq!(channel.read_raw(&mut out, 8).unwrap(), 0);
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(channel.last_len(), 0);
}

#[test]
fn test_line_settings_applied() {
    let pty = open_pty();
    let channel = SerialChannel::open(&pty.slave, 9600, 255).unwrap();
    assert_eq!(channel.line().unwrap().baud_rate.value(), 9600);

    let applied = channel.device_settings().unwrap();
    assert_eq!(applied, LineConfig::new(9600).unwrap());
    assert_eq!(applied.to_string(), "9600 8N1");
}

#[test]
fn test_write_with_feedback_polls_for_reply() {
    let pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, 255).unwrap();
    channel.set_read_policy(ReadPolicy::poll(WAIT));

    let peer = spawn_peer(&pty, 4, vec![0xA0, 0xA1, 0xA2, 0xA3]);

    let mut reply = [0u8; 4];
    let got = channel
        .write_with_feedback(&[0x10, 0x11, 0x12, 0x13], 4, &mut reply)
        .unwrap();

    assert_eq!(peer.join().unwrap(), vec![0x10, 0x11, 0x12, 0x13]);
    assert_eq!(got, 4);
    assert_eq!(reply, [0xA0, 0xA1, 0xA2, 0xA3]);
    assert_eq!(channel.last_len(), 4);
}

#[test]
fn test_immediate_feedback_reports_short_read() {
    let mut pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, 255).unwrap();
    assert_eq!(channel.read_policy(), ReadPolicy::Immediate);

    // Nobody answers, so the single read finds nothing
    let mut reply = [0u8; 2];
    let got = channel.write_with_feedback(&[0x55, 0xAA], 2, &mut reply).unwrap();
    assert_eq!(got, 0);
    assert_eq!(channel.last_len(), 0);

    assert_eq!(read_master(&mut pty.master, 2), vec![0x55, 0xAA]);
}

#[test]
fn test_feedback_reply_buffer_too_small() {
    let mut pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, 255).unwrap();

    let mut reply = [0u8; 2];
    assert!(matches!(
        channel.write_with_feedback(&[1, 2, 3], 3, &mut reply),
        Err(SerialError::OutputTooSmall {
            needed: 3,
            available: 2
        })
    ));
    assert!(matches!(
        channel.read_raw(&mut reply, 3),
        Err(SerialError::OutputTooSmall { .. })
    ));
    assert_nothing_sent(&mut pty.master);
}

#[test]
fn test_lf_framing() {
    let pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, 255).unwrap();
    channel.set_read_policy(ReadPolicy::poll(WAIT));

    let peer = spawn_peer(&pty, 3, b"ok\nnext".to_vec());

    let mut reply = [0u8; 32];
    let got = channel.write_with_feedback_lf(b"id", 2, &mut reply).unwrap();

    assert_eq!(peer.join().unwrap(), b"id\n".to_vec());
    assert_eq!(&reply[..got], b"ok\n");

    // The rest of the peer's output is still queued
    let mut rest = [0u8; 4];
    assert_eq!(channel.read_exact_within(&mut rest, WAIT).unwrap(), 4);
    assert_eq!(&rest, b"next");
}

#[test]
fn test_lf_frame_counts_terminator_against_capacity() {
    let mut pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, 4).unwrap();

    let mut reply = [0u8; 8];
    assert!(matches!(
        channel.write_with_feedback_lf(b"abcd", 4, &mut reply),
        Err(SerialError::BufferOverflow {
            requested: 5,
            capacity: 4
        })
    ));
    assert_nothing_sent(&mut pty.master);
}

#[test]
fn test_hex_framing() {
    let pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, 255).unwrap();
    channel.set_read_policy(ReadPolicy::poll(WAIT));

    let peer = spawn_peer(&pty, 3, vec![0x02, 0xBE, 0xEF]);

    let mut reply = [0u8; 3];
    let got = channel.write_with_feedback_hex(0x02, 0x1234, &mut reply).unwrap();

    assert_eq!(peer.join().unwrap(), vec![0x02, 0x12, 0x34]);
    assert_eq!(got, 3);
    assert_eq!(reply, [0x02, 0xBE, 0xEF]);
}

#[test]
fn test_hex_framing_custom_layout() {
    let pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, 255).unwrap();
    channel.set_read_policy(ReadPolicy::poll(WAIT));
    channel.set_frame_layout(FrameLayout::new(2, 1).unwrap());

    let peer = spawn_peer(&pty, 3, vec![0, 0, 0]);

    let mut reply = [0u8; 3];
    channel.write_with_feedback_hex(0x0102, 0x03, &mut reply).unwrap();
    assert_eq!(peer.join().unwrap(), vec![0x01, 0x02, 0x03]);

    assert!(matches!(
        channel.write_with_feedback_hex(0, 0x100, &mut reply),
        Err(SerialError::FieldOverflow { .. })
    ));
}

#[test]
fn test_overflow_sends_nothing() {
    let mut pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, 4).unwrap();

    channel.load_buffer(&[9, 9], 2).unwrap();
    assert!(matches!(
        channel.write_without_feedback(&[1, 2, 3, 4, 5], 5),
        Err(SerialError::BufferOverflow { .. })
    ));
    assert_eq!(channel.buffer(), &[9, 9, 0, 0]);
    assert_nothing_sent(&mut pty.master);
}

#[test]
fn test_shorter_frame_after_longer_one() {
    let mut pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, 8).unwrap();

    channel.write_without_feedback(&[0xFF; 6], 6).unwrap();
    assert_eq!(read_master(&mut pty.master, 6), vec![0xFF; 6]);

    channel.write_without_feedback(&[0x01, 0x02], 2).unwrap();
    assert_eq!(read_master(&mut pty.master, 2), vec![0x01, 0x02]);
    assert_eq!(channel.buffer(), &[0x01, 0x02, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn test_close_then_reconnect() {
    let mut pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, 8).unwrap();
    channel.load_buffer(&[7; 8], 8).unwrap();

    assert!(matches!(
        channel.connect(&pty.slave, LineConfig::default()),
        Err(SerialError::AlreadyOpen)
    ));

    channel.close().unwrap();
    assert!(!channel.is_open());
    assert!(matches!(channel.close(), Err(SerialError::AlreadyClosed)));
    assert!(matches!(
        channel.write_without_feedback(&[1], 1),
        Err(SerialError::NotOpen)
    ));

    channel.connect(&pty.slave, LineConfig::new(57600).unwrap()).unwrap();
    assert!(channel.is_open());
    assert_eq!(channel.last_len(), 0);
    assert!(channel.buffer().iter().all(|&b| b == 0));

    channel.write_without_feedback(&[0x42], 1).unwrap();
    assert_eq!(read_master(&mut pty.master, 1), vec![0x42]);
}

#[test]
fn test_drop_releases_device() {
    let mut pty = open_pty();
    let channel = SerialChannel::open(&pty.slave, 115200, 255).unwrap();
    drop(channel);

    // With the only slave descriptor gone the master sees a hangup
    let mut buf = [0u8; 1];
    let err = pty.master.read(&mut buf).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EIO));
}

#[test]
fn test_write_buffer_sends_loaded_frame_after_read() {
    let mut pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, 16).unwrap();

    channel.load_buffer(&[1, 2, 3, 4], 4).unwrap();
    let mut out = [0u8; 4];
    assert_eq!(channel.read_raw(&mut out, 4).unwrap(), 0);
    assert_eq!(channel.last_len(), 0);

    assert_eq!(channel.write_buffer().unwrap(), 4);
    assert_eq!(channel.last_len(), 4);
    assert_eq!(read_master(&mut pty.master, 4), vec![1, 2, 3, 4]);
}

#[test]
fn test_short_write_is_reported() {
    const FRAME: usize = 1 << 20;

    let pty = open_pty();
    let mut channel = SerialChannel::open(&pty.slave, 115200, FRAME).unwrap();

    // Keep the master draining so the pty never stalls the drain
    let (done, expected) = mpsc::channel::<usize>();
    let mut master = pty.master.try_clone().unwrap();
    let reader = thread::spawn(move || {
        let deadline = Instant::now() + WAIT;
        let mut buf = [0u8; 4096];
        let mut total = 0;
        let mut target = None;
        while Instant::now() < deadline {
            if target.is_none() {
                target = expected.try_recv().ok();
            }
            if target.is_some_and(|n| total >= n) {
                break;
            }
            match master.read(&mut buf) {
                Ok(k) => total += k,
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(Duration::from_millis(1)),
                Err(e) => panic!("master read failed: {e}"),
            }
        }
        total
    });

    let frame = vec![0x5A; FRAME];
    let written = channel.write_without_feedback(&frame, FRAME).unwrap();
    done.send(written).unwrap();

    assert!(written < FRAME, "pty accepted the whole {FRAME} byte frame");
    assert_eq!(channel.last_len(), written);
    assert_eq!(reader.join().unwrap(), written);
}
