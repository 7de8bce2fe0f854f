//! BLAKE2s-256 hash core
//!
//! The core hashes messages of at most one block. After `CTRL_INIT` the 16 block words and the message length in
//! bytes are loaded and `CTRL_FINISH` compresses the final block. `STATUS` is non-zero whenever the core is idle.

use super::{wait_for, AcceleratorPort, SelfTestOutcome, SelfTestReport};

pub(super) const CTRL: u32 = 0x08;
pub(super) const STATUS: u32 = 0x09;
pub(super) const BLOCK_LEN: u32 = 0x0a;
pub(super) const BLOCK_BASE: u32 = 0x10;
pub(super) const DIGEST_BASE: u32 = 0x40;

pub(super) const CTRL_INIT: u32 = 0x1;
pub(super) const CTRL_FINISH: u32 = 0x4;

const BLOCK_WORDS: usize = 16;
const DIGEST_WORDS: usize = 8;

pub(super) const EMPTY_DIGEST: [u32; DIGEST_WORDS] = [
    0x6921_7a30, 0x7990_8094, 0xe111_21d0, 0x4235_4a7c, 0x1f55_b648, 0x2ca1_a51e, 0x1b25_0dfd, 0x1ed0_eef9,
];

/// Test vector of RFC 7693 appendix B
pub(super) const ABC_DIGEST: [u32; DIGEST_WORDS] = [
    0x508c_5e8c, 0x327c_14e2, 0xe1a7_2ba3, 0x4eeb_452f, 0x3745_8b20, 0x9ed6_3a29, 0x4d99_9b4c, 0x8667_5982,
];

fn hash_single_block(
    port: &mut impl AcceleratorPort,
    block: &[u32; BLOCK_WORDS],
    len: u32,
) -> [u32; DIGEST_WORDS] {
    port.write_word(CTRL, CTRL_INIT);
    wait_for(port, STATUS, |status| status != 0);

    for (address, word) in (BLOCK_BASE..).zip(block) {
        port.write_word(address, *word);
    }
    port.write_word(BLOCK_LEN, len);
    port.write_word(CTRL, CTRL_FINISH);
    wait_for(port, STATUS, |status| status != 0);

    let mut digest = [0; DIGEST_WORDS];
    for (address, word) in (DIGEST_BASE..).zip(digest.iter_mut()) {
        *word = port.read_word(address);
    }
    digest
}

pub(super) fn run(port: &mut impl AcceleratorPort, report: &mut SelfTestReport) {
    log::info!("blake2s with empty message");
    let digest = hash_single_block(port, &[0; BLOCK_WORDS], 0);
    report.push(SelfTestOutcome::check(
        "blake2s empty message",
        &EMPTY_DIGEST,
        &digest,
    ));

    log::info!("blake2s with message \"abc\"");
    log::info!("Input:    616263");
    let mut block = [0; BLOCK_WORDS];
    block[0] = 0x6162_6300;
    let digest = hash_single_block(port, &block, 3);
    report.push(SelfTestOutcome::check("blake2s abc", &ABC_DIGEST, &digest));
}
