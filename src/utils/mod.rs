//! Some utility functions

use minidom::Element;

/// The CalDAV XML namespace
pub const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";

/// Walks an XML tree and returns every element that has the given name in the given namespace, whatever its prefix
pub fn find_elems<'a, S: AsRef<str>>(root: &'a Element, searched_name: S, searched_ns: &str) -> Vec<&'a Element> {
    let searched_name = searched_name.as_ref();
    let mut elems: Vec<&Element> = Vec::new();

    for el in root.children() {
        if el.is(searched_name, searched_ns) {
            elems.push(el);
        } else {
            let ret = find_elems(el, searched_name, searched_ns);
            elems.extend(ret);
        }
    }
    elems
}

/// Decode the predefined XML entities, and the numeric references to CR and LF
pub fn xml_unescape(text: &str) -> String {
    text.replace("&#13;", "\r")
        .replace("&#xD;", "\r")
        .replace("&#10;", "\n")
        .replace("&#xA;", "\n")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Escape text so that it can be embedded into an XML element
pub fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Returns every `BEGIN:<component>` ... `END:<component>` block found in `text`, in order
pub fn extract_blocks(text: &str, component: &str) -> Vec<String> {
    let begin = format!("BEGIN:{}", component);
    let end = format!("END:{}", component);

    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(&begin) {
        let after_start = &rest[start..];
        match after_start.find(&end) {
            None => break,
            Some(stop) => {
                let stop = stop + end.len();
                blocks.push(after_start[..stop].to_string());
                rest = &after_start[stop..];
            },
        }
    }
    blocks
}
