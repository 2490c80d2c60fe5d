use crate::model::Contact;

const HEADER: &str = "name,phone,group,about";

/// Every value is double-quoted; embedded quotes are doubled. No contacts
/// means no content, not even a header.
pub(super) fn encode(contacts: &[Contact]) -> String {
    if contacts.is_empty() {
        return String::new();
    }

    let mut lines = Vec::with_capacity(contacts.len() + 1);
    lines.push(HEADER.to_string());
    for c in contacts {
        let row = [&c.name, &c.phone, &c.group, &c.about]
            .iter()
            .map(|v| quote(v))
            .collect::<Vec<_>>()
            .join(",");
        lines.push(row);
    }
    lines.join("\n")
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
