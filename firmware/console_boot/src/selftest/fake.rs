//! Behavioural models of the accelerators for host tests
//!
//! The models do not implement the real algorithms. They answer the known-answer tests with the known answers and
//! anything else with garbage, which is enough to check that the firmware drives the register protocol in the
//! right order.

use super::{blake2s, chacha, klein, Accelerator, AcceleratorPort};

pub(crate) trait FakeDevice {
    fn write(&mut self, address: u32, data: u32);
    fn read(&mut self, address: u32) -> u32;
}

/// An [`AcceleratorPort`] that forwards every access to a model
#[derive(Debug, Default)]
pub(crate) struct FakeAccelerator<D> {
    pub device: D,
    pub resets: usize,
    pub writes: usize,
    pub reads: usize,
}

impl<D> FakeAccelerator<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            resets: 0,
            writes: 0,
            reads: 0,
        }
    }
}

impl<D: FakeDevice> AcceleratorPort for FakeAccelerator<D> {
    fn write_word(&mut self, address: u32, data: u32) {
        self.writes += 1;
        self.device.write(address, data);
    }

    fn read_word(&mut self, address: u32) -> u32 {
        self.reads += 1;
        self.device.read(address)
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}

fn store<const N: usize>(words: &mut [u32; N], base: u32, address: u32, data: u32) -> bool {
    match address
        .checked_sub(base)
        .and_then(|index| words.get_mut(index as usize))
    {
        Some(word) => {
            *word = data;
            true
        }
        None => false,
    }
}

fn load<const N: usize>(words: &[u32; N], base: u32, address: u32) -> Option<u32> {
    address
        .checked_sub(base)
        .and_then(|index| words.get(index as usize))
        .copied()
}

/// Ciphers by xoring the key into the block, deciphering only works after the key schedule was run
#[derive(Debug, Default)]
pub(crate) struct FakeKlein {
    pub key: [u32; 2],
    pub block: [u32; 2],
    pub result: [u32; 2],
    pub conf: u32,
    pub status: u32,
    pub broken_decipher: bool,
}

impl FakeDevice for FakeKlein {
    fn write(&mut self, address: u32, data: u32) {
        match address {
            klein::CONF => self.conf = data,
            klein::CTRL if data == klein::CTRL_KEY_SCHEDULE => self.status = klein::STATUS_KEY_READY,
            klein::CTRL if data == klein::CTRL_START => {
                let scheduled = self.status == klein::STATUS_KEY_READY;
                self.result = [self.block[0] ^ self.key[0], self.block[1] ^ self.key[1]];
                if self.conf == klein::CONF_DECIPHER && (!scheduled || self.broken_decipher) {
                    self.result[0] = !self.result[0];
                }
                self.status = klein::STATUS_DONE;
            }
            _ => {
                if store(&mut self.key, klein::KEY[0], address, data) {
                    return;
                }
                store(&mut self.block, klein::BLOCK[0], address, data);
            }
        }
    }

    fn read(&mut self, address: u32) -> u32 {
        match address {
            klein::STATUS => self.status,
            _ => load(&self.result, klein::RESULT[0], address).unwrap_or(0),
        }
    }
}

/// Knows the digests of the empty message and of "abc"
#[derive(Debug, Default)]
pub(crate) struct FakeBlake2s {
    pub block: [u32; 16],
    pub block_len: u32,
    pub digest: [u32; 8],
    pub status: u32,
    pub inits: usize,
}

impl FakeDevice for FakeBlake2s {
    fn write(&mut self, address: u32, data: u32) {
        match address {
            blake2s::CTRL if data == blake2s::CTRL_INIT => {
                self.inits += 1;
                self.digest = [0; 8];
                self.status = 1;
            }
            blake2s::CTRL if data == blake2s::CTRL_FINISH => {
                let mut abc = [0; 16];
                abc[0] = 0x6162_6300;
                self.digest = match self.block_len {
                    0 if self.block == [0; 16] => blake2s::EMPTY_DIGEST,
                    3 if self.block == abc => blake2s::ABC_DIGEST,
                    _ => [0xbad; 8],
                };
                self.status = 1;
            }
            blake2s::BLOCK_LEN => self.block_len = data,
            _ => {
                store(&mut self.block, blake2s::BLOCK_BASE, address, data);
            }
        }
    }

    fn read(&mut self, address: u32) -> u32 {
        match address {
            blake2s::STATUS => self.status,
            _ => load(&self.digest, blake2s::DIGEST_BASE, address).unwrap_or(0),
        }
    }
}

/// Produces the key streams of the all-zero key and nonce for the tested configurations
#[derive(Debug, Default)]
pub(crate) struct FakeChacha {
    pub key: [u32; 8],
    pub iv: [u32; 2],
    pub data_in: [u32; 16],
    pub data_out: [u32; 16],
    pub key_len: u32,
    pub rounds: u32,
    pub block: u32,
    pub status: u32,
}

impl FakeChacha {
    fn key_stream(&self) -> [u32; 16] {
        let zero = self.key == [0; 8] && self.iv == [0; 2];
        match (zero, self.key_len, self.rounds, self.block) {
            (true, chacha::KEY_LEN_128, 8, 0) => chacha::ROUNDS_8_KEY_128,
            (true, chacha::KEY_LEN_256, 20, 0) => chacha::ROUNDS_20_KEY_256,
            (true, chacha::KEY_LEN_256, 20, 1) => chacha::ROUNDS_20_KEY_256_NEXT,
            _ => [0xbad; 16],
        }
    }
}

impl FakeDevice for FakeChacha {
    fn write(&mut self, address: u32, data: u32) {
        match address {
            chacha::CTRL if data == chacha::CTRL_INIT || data == chacha::CTRL_NEXT => {
                self.block = if data == chacha::CTRL_INIT { 0 } else { self.block + 1 };
                let stream = self.key_stream();
                for ((out, key), input) in self.data_out.iter_mut().zip(stream).zip(self.data_in) {
                    *out = key ^ input;
                }
                self.status = 1;
            }
            chacha::KEY_LEN => self.key_len = data,
            chacha::ROUNDS => self.rounds = data,
            _ => {
                let _ = store(&mut self.key, chacha::KEY_BASE, address, data)
                    || store(&mut self.iv, chacha::IV_BASE, address, data)
                    || store(&mut self.data_in, chacha::DATA_IN_BASE, address, data);
            }
        }
    }

    fn read(&mut self, address: u32) -> u32 {
        match address {
            chacha::STATUS => self.status,
            _ => load(&self.data_out, chacha::DATA_OUT_BASE, address).unwrap_or(0),
        }
    }
}

/// Any of the accelerator models, so that one port type serves all of them
#[derive(Debug)]
pub(crate) enum FakeAny {
    Klein(FakeKlein),
    Blake2s(FakeBlake2s),
    Chacha(FakeChacha),
}

impl FakeAny {
    pub fn for_accelerator(accelerator: Accelerator) -> Self {
        match accelerator {
            Accelerator::Klein => FakeAny::Klein(FakeKlein::default()),
            Accelerator::Blake2s => FakeAny::Blake2s(FakeBlake2s::default()),
            Accelerator::Chacha => FakeAny::Chacha(FakeChacha::default()),
        }
    }
}

impl FakeDevice for FakeAny {
    fn write(&mut self, address: u32, data: u32) {
        match self {
            FakeAny::Klein(device) => device.write(address, data),
            FakeAny::Blake2s(device) => device.write(address, data),
            FakeAny::Chacha(device) => device.write(address, data),
        }
    }

    fn read(&mut self, address: u32) -> u32 {
        match self {
            FakeAny::Klein(device) => device.read(address),
            FakeAny::Blake2s(device) => device.read(address),
            FakeAny::Chacha(device) => device.read(address),
        }
    }
}
