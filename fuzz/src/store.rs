// Copyright 2026 ParameterStore authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use parameter_store::{
    StoreDriver, StoreDriverOff, StoreDriverOn, StoreInterruption, StoreInvariant,
};
use rand_core::{RngCore, SeedableRng};
use rand_pcg::Pcg32;

/// Keys used by the fuzzer.
///
/// A small pool maximizes overwrites, which is where the interesting
/// tombstone and recovery behavior lives.
const KEYS: &[&str] = &[
    "battery", "boot", "cal", "chan", "epoch", "mode", "node", "tune",
];

/// Largest value length the fuzzer stores.
const MAX_LEN: usize = 24;

/// Reads a fuzz input as a sequence of byte-sized decisions.
///
/// Decisions consume whole bytes, never bits, so that fuzzer mutations stay
/// aligned with decision boundaries: flipping one input byte changes one
/// decision instead of shifting every later one. Reads past the end return
/// zero, which maps to the quietest decision (no interruption, the first
/// key, an empty value), so truncated inputs wind down instead of diverging.
struct Script<'a> {
    /// The fuzz input being decoded.
    data: &'a [u8],

    /// Position of the next decision byte.
    head: usize,
}

impl Script<'_> {
    /// Creates a script over a fuzz input.
    fn new(data: &[u8]) -> Script {
        Script { data, head: 0 }
    }

    /// Returns whether all decision bytes have been consumed.
    fn is_done(&self) -> bool {
        self.head == self.data.len()
    }

    /// Reads one decision byte, or 0 once the input is exhausted.
    fn byte(&mut self) -> u8 {
        match self.data.get(self.head) {
            None => 0,
            Some(&byte) => {
                self.head += 1;
                byte
            }
        }
    }

    /// Reads a decision between `min` and `max` (inclusive bounds).
    ///
    /// Consumes one byte, or two when the range is wider than a byte. The
    /// write budgets of this store (a region of a few hundred bytes, plus
    /// its reset) never need more than two.
    fn range(&mut self, min: usize, max: usize) -> usize {
        let count = max - min + 1;
        let mut wide = self.byte() as usize;
        if count > 1 << 8 {
            wide = wide << 8 | self.byte() as usize;
        }
        min + wide % count
    }
}

/// Checks the store against a sequence of manipulations.
///
/// The script generating the sequence of manipulations is provided in
/// `data`. Debugging information is printed if `debug` is set.
pub fn fuzz(mut data: &[u8], debug: bool) {
    // Bound the input size to keep runs below the fuzzing timeout.
    const MAX_DATA_LEN: usize = 10_000;
    if data.len() > MAX_DATA_LEN {
        data = &data[..MAX_DATA_LEN];
    }
    let mut script = Script::new(data);

    // Values come from a pseudo-random generator to avoid spending script
    // bytes on payload content, which rarely matters.
    let mut seed = [0; 16];
    for byte in seed.iter_mut() {
        *byte = script.byte();
    }
    let mut values = Pcg32::from_seed(seed);

    let len = script.range(30, 512);
    if debug {
        println!("region: {} bytes", len);
    }
    let mut driver = StoreDriver::Off(StoreDriverOff::new(len));
    while !script.is_done() {
        driver = match driver {
            StoreDriver::Off(driver) => power_on(driver, &mut script, debug),
            StoreDriver::On(driver) => apply(driver, &mut script, &mut values, debug),
        };
    }

    // Whatever state the sequence left behind must boot and round-trip.
    let driver = match driver.power_on() {
        Ok(driver) => driver,
        Err(invariant) => crash(invariant),
    };
    round_trip(driver, debug);
}

/// Powers the store on, interrupting recovery for part of the scripts.
fn power_on(driver: StoreDriverOff, script: &mut Script, debug: bool) -> StoreDriver {
    let interruption = interruption(script, driver.count_power_on_bytes());
    if debug {
        println!("power on (interrupt: {})", interruption.delay != usize::MAX);
    }
    match driver.partial_power_on(interruption) {
        Ok(driver) => driver,
        Err((_, invariant)) => crash(invariant),
    }
}

/// Applies the next scripted write with a possible interruption.
///
/// One opcode byte decides between powering off and writing, and selects the
/// key; the value length and the interruption point are scripted separately.
fn apply(
    driver: StoreDriverOn,
    script: &mut Script,
    values: &mut Pcg32,
    debug: bool,
) -> StoreDriver {
    let opcode = script.byte();
    if opcode % 8 == 0 {
        if debug {
            println!("power off");
        }
        return StoreDriver::Off(driver.power_off());
    }
    let key = KEYS[(opcode >> 3) as usize % KEYS.len()];
    let length = script.range(0, MAX_LEN);
    let mut value = vec![0; length];
    values.fill_bytes(&mut value);
    let interruption = interruption(script, driver.count_set_bytes(key, &value));
    if debug {
        println!(
            "set {} ({} bytes, interrupt: {})",
            key,
            length,
            interruption.delay != usize::MAX
        );
    }
    match driver.partial_set(key, &value, interruption) {
        Ok((error, driver)) => {
            if debug {
                if let Some(error) = error {
                    println!("{:?}", error);
                }
            }
            driver
        }
        Err((_, invariant)) => crash(invariant),
    }
}

/// Serializes the store to text and back, expecting identical content.
fn round_trip(mut driver: StoreDriverOn, debug: bool) {
    let store = driver.store_mut();
    let mut buffer = vec![0; 8192];
    let length = match store.serialize(&mut buffer) {
        Ok(length) => length,
        Err(error) => panic!("serialize failed: {:?}", error),
    };
    if debug {
        println!("round trip of {} bytes", length);
    }
    if let Err(error) = store.deserialize(&buffer[..length]) {
        panic!("deserialize failed: {:?}", error);
    }
    if let Err(invariant) = driver.check() {
        crash(invariant);
    }
}

/// Draws an interruption within the write budget of an operation.
fn interruption(script: &mut Script, count: Option<usize>) -> StoreInterruption {
    match count {
        Some(count) if script.byte() % 2 == 1 => StoreInterruption::pure(script.range(0, count)),
        _ => StoreInterruption::none(),
    }
}

/// Reports a broken invariant and terminates fuzzing.
fn crash(invariant: StoreInvariant) -> ! {
    panic!("{:?}", invariant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_reads_bytes_in_order() {
        let mut script = Script::new(&[3, 7]);
        assert_eq!(script.byte(), 3);
        assert!(!script.is_done());
        assert_eq!(script.byte(), 7);
        assert!(script.is_done());
        assert_eq!(script.byte(), 0);
    }

    #[test]
    fn script_range_stays_in_bounds() {
        let mut script = Script::new(&[0x00, 0xfe, 0x80]);
        assert_eq!(script.range(4, 6), 4);
        assert_eq!(script.range(4, 6), 4 + 0xfe % 3);
        assert_eq!(script.range(0, 255), 0x80);
    }

    #[test]
    fn script_range_widens_past_one_byte() {
        let mut script = Script::new(&[0x01, 0x02]);
        // Two bytes are consumed for the 483-wide region range.
        assert_eq!(script.range(30, 512), 30 + 0x0102 % 483);
        assert!(script.is_done());
    }

    #[test]
    fn exhausted_script_winds_down() {
        let mut script = Script::new(&[]);
        assert_eq!(script.byte(), 0);
        assert_eq!(script.range(0, MAX_LEN), 0);
        assert_eq!(script.range(30, 512), 30);
    }
}
