use crate::error::RakNetError;

/// RakNet historically supports 32 ordering/sequencing channels; see
/// SPEC_FULL §12 for why this crate pins the value rather than leaving it
/// implementation-defined.
pub const MAX_CHANNELS: u8 = 32;

/// The reliability of an encapsulated message (spec §4.3). Generalized
/// from the teacher's five-variant `Reliability` to the full eight RakNet
/// defines, including the three `WITH_ACK_RECEIPT` variants that drive
/// `on_acknowledge`/`on_not_acknowledge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reliability {
    Unreliable = 0,
    UnreliableSequenced = 1,
    Reliable = 2,
    ReliableOrdered = 3,
    ReliableSequenced = 4,
    UnreliableWithAckReceipt = 5,
    ReliableWithAckReceipt = 6,
    ReliableOrderedWithAckReceipt = 7,
}

impl Reliability {
    /// Whether this variant is stamped with a reliable index and retained
    /// in the unacknowledged set until ACKed.
    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            Reliability::Reliable
                | Reliability::ReliableOrdered
                | Reliability::ReliableSequenced
                | Reliability::ReliableWithAckReceipt
                | Reliability::ReliableOrderedWithAckReceipt
        )
    }

    /// Whether this variant carries a sequence index (latest-wins
    /// delivery).
    pub fn is_sequenced(self) -> bool {
        matches!(
            self,
            Reliability::UnreliableSequenced | Reliability::ReliableSequenced
        )
    }

    /// Whether this variant carries an ordered index (strict in-order
    /// delivery).
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            Reliability::ReliableOrdered | Reliability::ReliableOrderedWithAckReceipt
        )
    }

    /// Whether an ordered index + channel field follows on the wire —
    /// true for both ordered and sequenced variants (spec §4.3: "if
    /// ordered or sequenced").
    pub fn has_ordering_channel(self) -> bool {
        self.is_ordered() || self.is_sequenced()
    }

    /// Whether receipt of the covering ACK/NACK should surface an
    /// `on_acknowledge`/`on_not_acknowledge` event.
    pub fn wants_ack_receipt(self) -> bool {
        matches!(
            self,
            Reliability::UnreliableWithAckReceipt
                | Reliability::ReliableWithAckReceipt
                | Reliability::ReliableOrderedWithAckReceipt
        )
    }
}

impl TryFrom<u8> for Reliability {
    type Error = RakNetError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unreliable),
            1 => Ok(Self::UnreliableSequenced),
            2 => Ok(Self::Reliable),
            3 => Ok(Self::ReliableOrdered),
            4 => Ok(Self::ReliableSequenced),
            5 => Ok(Self::UnreliableWithAckReceipt),
            6 => Ok(Self::ReliableWithAckReceipt),
            7 => Ok(Self::ReliableOrderedWithAckReceipt),
            _ => Err(RakNetError::InvalidReliability(value)),
        }
    }
}

/// A channel selector for ordered/sequenced delivery, `0..MAX_CHANNELS`.
/// Defaults to channel 0 (spec §6: "`Channel` defaults to 0").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Channel(pub u8);

impl Channel {
    pub fn validate(self) -> Result<(), RakNetError> {
        if self.0 >= MAX_CHANNELS {
            return Err(RakNetError::InvalidChannel(self.0));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ordered_and_sequenced_are_mutually_exclusive() {
        for raw in 0..=7u8 {
            let r = Reliability::try_from(raw).unwrap();
            assert!(!(r.is_ordered() && r.is_sequenced()));
        }
    }

    #[test]
    fn unknown_reliability_is_an_error() {
        assert!(matches!(
            Reliability::try_from(8),
            Err(RakNetError::InvalidReliability(8))
        ));
    }

    #[test]
    fn ack_receipt_variants_are_flagged() {
        assert!(Reliability::UnreliableWithAckReceipt.wants_ack_receipt());
        assert!(Reliability::ReliableWithAckReceipt.wants_ack_receipt());
        assert!(Reliability::ReliableOrderedWithAckReceipt.wants_ack_receipt());
        assert!(!Reliability::Reliable.wants_ack_receipt());
    }

    #[test]
    fn channel_validates_against_max() {
        assert!(Channel(0).validate().is_ok());
        assert!(Channel(MAX_CHANNELS - 1).validate().is_ok());
        assert!(Channel(MAX_CHANNELS).validate().is_err());
    }
}
