use serde::{de::Visitor, ser::SerializeTuple, Deserialize, Deserializer, Serialize};
use std::{fmt, marker::PhantomData};

/// Null-terminated string stored in a zero-padded fixed-width header field
/// (`sname` is 64 bytes, `file` is 128).
#[derive(Clone, PartialEq, Eq)]
pub struct PaddedField<const N: usize>([u8; N]);

pub type SnameField = PaddedField<64>;
pub type FileField = PaddedField<128>;

impl<const N: usize> PaddedField<N> {
    /// Copies `text`, truncated so that at least one terminating zero remains.
    pub fn new(text: &str) -> PaddedField<N> {
        let mut field = [0u8; N];
        let len = text.len().min(N.saturating_sub(1));
        field[..len].copy_from_slice(&text.as_bytes()[..len]);
        PaddedField(field)
    }

    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(N);
        &self.0[..end]
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl<const N: usize> Default for PaddedField<N> {
    fn default() -> Self {
        PaddedField([0u8; N])
    }
}

impl<const N: usize> fmt::Display for PaddedField<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl<const N: usize> fmt::Debug for PaddedField<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

struct PaddedFieldVisitor<const N: usize>(PhantomData<[u8; N]>);

impl<'de, const N: usize> Visitor<'de> for PaddedFieldVisitor<N> {
    type Value = PaddedField<N>;
    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "{} bytes", N)
    }
    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut field = [0u8; N];
        for (i, slot) in field.iter_mut().enumerate() {
            *slot = seq
                .next_element::<u8>()?
                .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
        }
        Ok(PaddedField(field))
    }
}

impl<'de, const N: usize> Deserialize<'de> for PaddedField<N> {
    fn deserialize<D>(deserializer: D) -> Result<PaddedField<N>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_tuple(N, PaddedFieldVisitor(PhantomData))
    }
}

impl<const N: usize> Serialize for PaddedField<N> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut t = serializer.serialize_tuple(N)?;
        for n in &self.0 {
            t.serialize_element(n)?;
        }
        t.end()
    }
}

#[test]
fn truncate_test() {
    let long = "x".repeat(100);
    let field = SnameField::new(&long);
    assert_eq!(field.as_bytes().len(), 63);
    assert_eq!(field.0[63], 0);
}

#[test]
fn null_terminated_test() {
    let mut raw = [0u8; 128];
    raw[..9].copy_from_slice(b"pxelinux\0");
    raw[20] = b'z'; // garbage after the terminator is not part of the name
    let field: FileField = PaddedField(raw);
    assert_eq!(field.to_string(), "pxelinux");
    assert!(!field.is_empty());
    assert!(FileField::default().is_empty());
}
