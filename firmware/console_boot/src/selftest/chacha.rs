//! ChaCha stream cipher core
//!
//! The core xors one 64 byte block of input with the key stream. `CTRL_INIT` starts a new stream from the loaded
//! key and nonce, `CTRL_NEXT` continues it with the next block. The trigger of this core has to keep its reset bit
//! set, otherwise the key stream state is lost between accesses.

use super::{wait_for, AcceleratorPort, HexWords, SelfTestOutcome, SelfTestReport};

pub(super) const CTRL: u32 = 0x08;
pub(super) const STATUS: u32 = 0x09;
pub(super) const KEY_LEN: u32 = 0x0a;
pub(super) const ROUNDS: u32 = 0x0b;
pub(super) const KEY_BASE: u32 = 0x10;
pub(super) const IV_BASE: u32 = 0x20;
pub(super) const DATA_IN_BASE: u32 = 0x40;
pub(super) const DATA_OUT_BASE: u32 = 0x80;

pub(super) const CTRL_INIT: u32 = 0x01;
pub(super) const CTRL_NEXT: u32 = 0x02;

pub(super) const KEY_LEN_128: u32 = 0x00;
pub(super) const KEY_LEN_256: u32 = 0x01;

const BLOCK_WORDS: usize = 16;

pub(super) const ROUNDS_8_KEY_128: [u32; BLOCK_WORDS] = [
    0xe28a_5fa4, 0xa67f_8c5d, 0xefed_3e6f, 0xb730_3486, 0xaa84_27d3, 0x1419_a729, 0x572d_7779, 0x5349_1120,
    0xb64a_b8e7, 0x2b8d_eb85, 0xcd6a_ea7c, 0xb608_9a10, 0x1824_beeb, 0x0881_4a42, 0x8aab_1fa2, 0xc816_081b,
];

pub(super) const ROUNDS_20_KEY_256: [u32; BLOCK_WORDS] = [
    0x76b8_e0ad, 0xa0f1_3d90, 0x405d_6ae5, 0x5386_bd28, 0xbdd2_19b8, 0xa08d_ed1a, 0xa836_efcc, 0x8b77_0dc7,
    0xda41_597c, 0x5157_488d, 0x7724_e03f, 0xb8d8_4a37, 0x6a43_b8f4, 0x1518_a11c, 0xc387_b669, 0xb2ee_6586,
];

pub(super) const ROUNDS_20_KEY_256_NEXT: [u32; BLOCK_WORDS] = [
    0x9f07_e7be, 0x5551_387a, 0x98ba_977c, 0x732d_080d, 0xcb0f_29a0, 0x48e3_6569, 0x12c6_533e, 0x32ee_7aed,
    0x29b7_2176, 0x9ce6_4e43, 0xd571_33b0, 0x74d8_39d5, 0x31ed_1f28, 0x510a_fb45, 0xace1_0a1f, 0x4b79_4d6f,
];

/// Inputs of one block computation
struct CipherJob {
    key_len: u32,
    key: [u32; 8],
    iv: [u32; 2],
    rounds: u32,
    data_in: [u32; BLOCK_WORDS],
}

fn read_output(port: &mut impl AcceleratorPort) -> [u32; BLOCK_WORDS] {
    wait_for(port, STATUS, |status| status != 0);
    let mut data_out = [0; BLOCK_WORDS];
    for (address, word) in (DATA_OUT_BASE..).zip(data_out.iter_mut()) {
        *word = port.read_word(address);
    }
    data_out
}

fn cipher(port: &mut impl AcceleratorPort, job: &CipherJob) -> [u32; BLOCK_WORDS] {
    for (address, word) in (KEY_BASE..).zip(job.key) {
        port.write_word(address, word);
    }
    for (address, word) in (DATA_IN_BASE..).zip(job.data_in) {
        port.write_word(address, word);
    }
    for (address, word) in (IV_BASE..).zip(job.iv) {
        port.write_word(address, word);
    }
    port.write_word(KEY_LEN, job.key_len);
    port.write_word(ROUNDS, job.rounds);
    port.write_word(CTRL, CTRL_INIT);
    read_output(port)
}

fn next_block(port: &mut impl AcceleratorPort) -> [u32; BLOCK_WORDS] {
    port.write_word(CTRL, CTRL_NEXT);
    read_output(port)
}

fn describe(title: &str, job: &CipherJob) {
    log::info!("{}", title);
    log::info!("Key:      {}", HexWords(&job.key));
    log::info!("IV:       {}", HexWords(&job.iv));
}

pub(super) fn run(port: &mut impl AcceleratorPort, report: &mut SelfTestReport) {
    let mut job = CipherJob {
        key_len: KEY_LEN_128,
        key: [0; 8],
        iv: [0; 2],
        rounds: 8,
        data_in: [0; BLOCK_WORDS],
    };
    describe("chacha with 8 rounds and a 128 bit key", &job);
    let out = cipher(port, &job);
    report.push(SelfTestOutcome::check(
        "chacha 8 rounds 128 bit key",
        &ROUNDS_8_KEY_128,
        &out,
    ));

    job.key_len = KEY_LEN_256;
    job.rounds = 20;
    describe("chacha with 20 rounds and a 256 bit key", &job);
    let out = cipher(port, &job);
    report.push(SelfTestOutcome::check(
        "chacha 20 rounds 256 bit key",
        &ROUNDS_20_KEY_256,
        &out,
    ));

    log::info!("chacha with 20 rounds and a 256 bit key, next block");
    let out = next_block(port);
    report.push(SelfTestOutcome::check(
        "chacha next block",
        &ROUNDS_20_KEY_256_NEXT,
        &out,
    ));
}
