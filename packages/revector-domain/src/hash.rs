/// Fingerprint of the embeddable text of a source record. Deterministic and
/// fixed-length, so two saves of identical content always collide and any
/// edit to an embeddable field always differs.
pub fn content_hash(text: &str) -> String {
	blake3::hash(text.as_bytes()).to_hex().to_string()
}
