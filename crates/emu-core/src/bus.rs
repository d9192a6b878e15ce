//! The address space a processor executes against.

/// A 16-bit address space. Reads may have side effects (VIA flag clears),
/// so both methods take `&mut self`.
pub trait Bus {
    fn read(&mut self, address: u16) -> u8;

    fn write(&mut self, address: u16, value: u8);

    /// Little-endian word at `address`, as the 6502 fetches vectors.
    fn read_word(&mut self, address: u16) -> u16 {
        let lo = self.read(address);
        let hi = self.read(address.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }
}
