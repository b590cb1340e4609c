//! Static resolution of mode and key-material expressions
//!
//! Resolution is deliberately shallow: a literal constant, a single
//! module-level alias hop, or a conditional whose branches are all literal.
//! Anything needing data flow across function boundaries beyond one level
//! of indirection stays unresolved; the classifier labels it indeterminate
//! rather than guessing.

use crate::models::{CipherMode, ResolutionPath};
use tree_sitter::Node;

/// Outcome of resolving a key-material expression
#[derive(Debug, Clone)]
pub struct KeyInfo {
    /// The expression as written at the call site
    pub expr: String,
    /// Key length in bits when statically determinable
    pub bits: Option<u32>,
    /// Expression draws fresh random bytes on every evaluation
    pub random_per_call: bool,
}

fn node_text<'a>(node: Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// Resolve a PyCryptodome-style mode argument
pub fn resolve_mode(node: Node, root: Node, source: &[u8]) -> (Option<CipherMode>, ResolutionPath) {
    match node.kind() {
        // AES.MODE_ECB, Crypto.Cipher.AES.MODE_ECB
        "attribute" => {
            let token = node
                .child_by_field_name("attribute")
                .map(|n| node_text(n, source))
                .unwrap_or("");
            match mode_from_token(token) {
                Some(mode) => (Some(mode), ResolutionPath::Literal),
                None => (None, ResolutionPath::Unresolved),
            }
        }
        // Bare MODE_ECB (star import) or a module-level alias
        "identifier" => {
            let name = node_text(node, source);
            if let Some(mode) = mode_from_token(name) {
                return (Some(mode), ResolutionPath::Literal);
            }
            match unique_assignment(root, source, name) {
                Some(rhs) => match resolve_literal_only(rhs, source) {
                    Some(mode) => (Some(mode), ResolutionPath::AliasHop),
                    // A second identifier is a second hop; never guess
                    None => (None, ResolutionPath::Unresolved),
                },
                None => (None, ResolutionPath::Unresolved),
            }
        }
        // PyCryptodome mode constants are small integers
        "integer" => {
            let value = node_text(node, source).parse::<i64>().ok();
            match value.and_then(mode_from_int) {
                Some(mode) => (Some(mode), ResolutionPath::Literal),
                None => (None, ResolutionPath::Unresolved),
            }
        }
        // `MODE_A if flag else MODE_B` with all branches literal
        "conditional_expression" => resolve_conditional(node, root, source),
        "parenthesized_expression" => match node.named_child(0) {
            Some(inner) => resolve_mode(inner, root, source),
            None => (None, ResolutionPath::Unresolved),
        },
        // A call result (user-defined function) is always indeterminate
        _ => (None, ResolutionPath::Unresolved),
    }
}

/// Resolve a hazmat-style mode argument: `modes.ECB()`
pub fn resolve_hazmat_mode(node: Node, source: &[u8]) -> (Option<CipherMode>, ResolutionPath) {
    if node.kind() != "call" {
        return (None, ResolutionPath::Unresolved);
    }
    let Some(function) = node.child_by_field_name("function") else {
        return (None, ResolutionPath::Unresolved);
    };
    let token = match function.kind() {
        "attribute" => function
            .child_by_field_name("attribute")
            .map(|n| node_text(n, source))
            .unwrap_or(""),
        "identifier" => node_text(function, source),
        _ => return (None, ResolutionPath::Unresolved),
    };
    match mode_from_token(token) {
        Some(mode) => (Some(mode), ResolutionPath::Literal),
        None => (None, ResolutionPath::Unresolved),
    }
}

/// Conditional with every branch literal resolves; a disagreeing ECB branch
/// wins because an attacker-reachable branch selects ECB
fn resolve_conditional(
    node: Node,
    root: Node,
    source: &[u8],
) -> (Option<CipherMode>, ResolutionPath) {
    // conditional_expression: body `if` condition `else` alternative
    let body = node.named_child(0);
    let alternative = node.named_child(2);

    let (Some(body), Some(alternative)) = (body, alternative) else {
        return (None, ResolutionPath::Unresolved);
    };

    let left = resolve_branch(body, root, source);
    let right = resolve_branch(alternative, root, source);

    match (left, right) {
        (Some(a), Some(b)) if a == b => (Some(a), ResolutionPath::Conditional),
        (Some(a), Some(b)) => {
            if a == CipherMode::Ecb || b == CipherMode::Ecb {
                (Some(CipherMode::Ecb), ResolutionPath::Conditional)
            } else {
                // Branches disagree on non-ECB modes; classify the weaker
                let weaker = if !a.is_aead() { a } else { b };
                (Some(weaker), ResolutionPath::Conditional)
            }
        }
        _ => (None, ResolutionPath::Unresolved),
    }
}

/// Branches of a conditional may themselves only be literals
fn resolve_branch(node: Node, _root: Node, source: &[u8]) -> Option<CipherMode> {
    resolve_literal_only(node, source)
}

/// Resolve a node that must itself be a literal mode constant
fn resolve_literal_only(node: Node, source: &[u8]) -> Option<CipherMode> {
    match node.kind() {
        "attribute" => {
            let token = node
                .child_by_field_name("attribute")
                .map(|n| node_text(n, source))?;
            mode_from_token(token)
        }
        "identifier" => mode_from_token(node_text(node, source)),
        "integer" => node_text(node, source)
            .parse::<i64>()
            .ok()
            .and_then(mode_from_int),
        "parenthesized_expression" => resolve_literal_only(node.named_child(0)?, source),
        _ => None,
    }
}

/// Map a `MODE_*` token (or bare mode name) to a mode
pub fn mode_from_token(token: &str) -> Option<CipherMode> {
    let name = token.strip_prefix("MODE_").unwrap_or(token);
    match name {
        "ECB" => Some(CipherMode::Ecb),
        "CBC" => Some(CipherMode::Cbc),
        "CFB" | "CFB8" => Some(CipherMode::Cfb),
        "OFB" => Some(CipherMode::Ofb),
        "CTR" => Some(CipherMode::Ctr),
        "GCM" => Some(CipherMode::Gcm),
        "EAX" => Some(CipherMode::Eax),
        "CCM" => Some(CipherMode::Ccm),
        "SIV" => Some(CipherMode::Siv),
        "OCB" => Some(CipherMode::Ocb),
        "OPENPGP" => Some(CipherMode::OpenPgp),
        _ => None,
    }
}

/// PyCryptodome numeric mode constants (Crypto/Cipher/AES.py)
fn mode_from_int(value: i64) -> Option<CipherMode> {
    match value {
        1 => Some(CipherMode::Ecb),
        2 => Some(CipherMode::Cbc),
        3 => Some(CipherMode::Cfb),
        5 => Some(CipherMode::Ofb),
        6 => Some(CipherMode::Ctr),
        7 => Some(CipherMode::OpenPgp),
        8 => Some(CipherMode::Ccm),
        9 => Some(CipherMode::Eax),
        10 => Some(CipherMode::Siv),
        11 => Some(CipherMode::Gcm),
        12 => Some(CipherMode::Ocb),
        _ => None,
    }
}

/// Find the right-hand side of the single `name = value` assignment in the
/// fragment. Two or more assignments to the same name are ambiguous and
/// resolve to nothing.
fn unique_assignment<'a>(root: Node<'a>, source: &[u8], name: &str) -> Option<Node<'a>> {
    let mut found = Vec::new();
    collect_assignments(root, source, name, &mut found);
    match found.as_slice() {
        [single] => single.child_by_field_name("right"),
        _ => None,
    }
}

fn collect_assignments<'a>(node: Node<'a>, source: &[u8], name: &str, out: &mut Vec<Node<'a>>) {
    if node.kind() == "assignment" {
        if let Some(left) = node.child_by_field_name("left") {
            if left.kind() == "identifier" && node_text(left, source) == name {
                out.push(node);
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_assignments(child, source, name, out);
    }
}

/// Resolve a key-material expression to its static length, if any
pub fn resolve_key(node: Node, root: Node, source: &[u8]) -> KeyInfo {
    let expr = node_text(node, source).to_string();
    let (bits, random_per_call) = key_bits(node, root, source, 0);
    KeyInfo {
        expr,
        bits,
        random_per_call,
    }
}

/// Depth-limited key length resolution; depth 1 permits one alias hop
fn key_bits(node: Node, root: Node, source: &[u8], depth: u32) -> (Option<u32>, bool) {
    match node.kind() {
        "string" => (string_byte_length(node).map(|n| n * 8), false),
        "call" => {
            let Some(function) = node.child_by_field_name("function") else {
                return (None, false);
            };
            let name = match function.kind() {
                "attribute" => function
                    .child_by_field_name("attribute")
                    .map(|n| node_text(n, source))
                    .unwrap_or(""),
                "identifier" => node_text(function, source),
                _ => "",
            };
            match name {
                // os.urandom(16), get_random_bytes(16), secrets.token_bytes(16)
                "urandom" | "get_random_bytes" | "token_bytes" => {
                    let bits = first_integer_argument(node, source).map(|n| n * 8);
                    (bits, true)
                }
                // "secret".encode() keeps the receiver's length
                "encode" => {
                    if function.kind() == "attribute" {
                        if let Some(object) = function.child_by_field_name("object") {
                            if object.kind() == "string" {
                                return (
                                    string_byte_length(object).map(|n| n * 8),
                                    false,
                                );
                            }
                        }
                    }
                    (None, false)
                }
                _ => (None, false),
            }
        }
        "identifier" if depth == 0 => {
            let name = node_text(node, source);
            match unique_assignment(root, source, name) {
                Some(rhs) => key_bits(rhs, root, source, depth + 1),
                None => (None, false),
            }
        }
        "parenthesized_expression" => match node.named_child(0) {
            Some(inner) => key_bits(inner, root, source, depth),
            None => (None, false),
        },
        _ => (None, false),
    }
}

fn first_integer_argument(call: Node, source: &[u8]) -> Option<u32> {
    let args = call.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    for child in args.named_children(&mut cursor) {
        if child.kind() == "integer" {
            return node_text(child, source).parse().ok();
        }
    }
    None
}

/// Byte length of a string literal, counting escape sequences as one byte.
/// Returns None for non-bytes strings without an explicit `.encode()`.
fn string_byte_length(node: Node) -> Option<u32> {
    // Byte and plain string literals count the same way; a plain str used
    // directly as key material is rejected by the library at runtime, but
    // its length is still what the decision table needs
    Some(count_content_bytes(node))
}

fn count_content_bytes(node: Node) -> u32 {
    let mut total = 0u32;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "string_content" => {
                let mut inner = child.walk();
                let mut escaped = 0u32;
                for grandchild in child.children(&mut inner) {
                    if grandchild.kind() == "escape_sequence" {
                        escaped += grandchild.byte_range().len() as u32;
                        total += 1;
                    }
                }
                total += child.byte_range().len() as u32 - escaped;
            }
            "escape_sequence" => total += 1,
            _ => {}
        }
    }
    total
}
