/// Appends one field in export format. Values containing a newline (or any other control byte
/// besides tab) use the length-prefixed binary form, as journald does.
pub fn write_field(out: &mut Vec<u8>, name: &str, value: &[u8]) {
    out.extend_from_slice(name.as_bytes());
    if value.iter().any(|b| *b < b' ' && *b != b'\t') {
        out.push(b'\n');
        out.extend_from_slice(&(value.len() as u64).to_le_bytes());
        out.extend_from_slice(value);
    } else {
        out.push(b'=');
        out.extend_from_slice(value);
    }
    out.push(b'\n');
}

/// Appends a whole record: every field followed by the blank terminator line.
pub fn write_record<'a, I>(out: &mut Vec<u8>, fields: I)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    for (name, value) in fields {
        write_field(out, name, value.as_bytes());
    }
    out.push(b'\n');
}
