//! KLEIN-64 block cipher core

use super::{wait_for, AcceleratorPort, HexWords, SelfTestOutcome, SelfTestReport};

pub(super) const CTRL: u32 = 0x00;
pub(super) const CONF: u32 = 0x01;
pub(super) const STATUS: u32 = 0x02;
pub(super) const KEY: [u32; 2] = [0x10, 0x11];
pub(super) const BLOCK: [u32; 2] = [0x20, 0x21];
pub(super) const RESULT: [u32; 2] = [0x30, 0x31];

pub(super) const CONF_DECIPHER: u32 = 0;
pub(super) const CONF_CIPHER: u32 = 1;
pub(super) const CTRL_KEY_SCHEDULE: u32 = 1;
pub(super) const CTRL_START: u32 = 2;
pub(super) const STATUS_KEY_READY: u32 = 1;
pub(super) const STATUS_DONE: u32 = 3;

const PLAINTEXT: [u32; 2] = [0xdead_beef, 0xf000_000f];
const TEST_KEY: [u32; 2] = [0x1234_5678, 0x90ab_cdef];

fn load(port: &mut impl AcceleratorPort, block: [u32; 2], conf: u32) {
    for (address, word) in BLOCK.into_iter().zip(block) {
        port.write_word(address, word);
    }
    for (address, word) in KEY.into_iter().zip(TEST_KEY) {
        port.write_word(address, word);
    }
    port.write_word(CONF, conf);
}

fn result(port: &mut impl AcceleratorPort) -> [u32; 2] {
    RESULT.map(|address| port.read_word(address))
}

/// Encrypt a block and decrypt the ciphertext again, which has to yield the plaintext
pub(super) fn run(port: &mut impl AcceleratorPort, report: &mut SelfTestReport) {
    port.reset();

    load(port, PLAINTEXT, CONF_CIPHER);
    port.write_word(CTRL, CTRL_START);
    wait_for(port, STATUS, |status| status == STATUS_DONE);
    let ciphertext = result(port);

    log::info!("klein cipher and decipher");
    log::info!("Input:    {}", HexWords(&PLAINTEXT));
    log::info!("Key:      {}", HexWords(&TEST_KEY));
    log::info!("Cipher:   {}", HexWords(&ciphertext));

    // deciphering needs the last round key, which the core derives in a separate pass
    load(port, ciphertext, CONF_DECIPHER);
    port.write_word(CTRL, CTRL_KEY_SCHEDULE);
    wait_for(port, STATUS, |status| status == STATUS_KEY_READY);
    port.write_word(CTRL, CTRL_START);
    wait_for(port, STATUS, |status| status == STATUS_DONE);
    let deciphered = result(port);

    report.push(SelfTestOutcome::check(
        "klein cipher/decipher",
        &PLAINTEXT,
        &deciphered,
    ));
}
