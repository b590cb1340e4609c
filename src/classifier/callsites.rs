//! Cipher call-site extraction from Python fragments
//!
//! Walks the tree-sitter syntax tree for cipher-construction call
//! expressions and lifts each into a structured `CipherCallSite`. Two
//! factory families are recognized:
//!
//! - PyCryptodome: `AES.new(key, AES.MODE_ECB)` (also DES/DES3/ARC2/ARC4/
//!   Blowfish)
//! - cryptography hazmat: `Cipher(algorithms.AES(key), modes.ECB())`

use crate::classifier::resolve;
use crate::errors::EngineError;
use crate::models::{
    CipherAlgorithm, CipherCallSite, CodeFragment, EnclosingFunction, ResolutionPath,
};
use tree_sitter::{Node, Parser, Tree};

/// Parse a fragment into a Python syntax tree.
///
/// tree-sitter recovers from most syntax errors; a `ParseFailure` here means
/// the parser gave up entirely and the caller should take the fallback path.
pub fn parse_fragment(source: &str) -> Result<Tree, EngineError> {
    let mut parser = Parser::new();
    let language = tree_sitter_python::LANGUAGE;
    parser
        .set_language(&language.into())
        .map_err(|e| EngineError::ParseFailure(format!("failed to set Python language: {}", e)))?;

    parser
        .parse(source, None)
        .ok_or_else(|| EngineError::ParseFailure("parser returned no tree".to_string()))
}

/// Extract all cipher call sites from a parsed fragment
pub fn extract_call_sites(fragment: &CodeFragment, tree: &Tree) -> Vec<CipherCallSite> {
    let source = fragment.source.as_bytes();
    let root = tree.root_node();

    let mut calls = Vec::new();
    collect_calls(root, &mut calls);

    let mut sites = Vec::new();
    for call in &calls {
        if let Some(site) = pycryptodome_site(fragment, *call, root, source, &calls) {
            sites.push(site);
        } else if let Some(site) = hazmat_site(fragment, *call, root, source, &calls) {
            sites.push(site);
        }
    }
    sites
}

/// Depth-first collection of every call expression in the fragment
fn collect_calls<'a>(node: Node<'a>, out: &mut Vec<Node<'a>>) {
    if node.kind() == "call" {
        out.push(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_calls(child, out);
    }
}

fn node_text<'a>(node: Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// `AES.new(key, AES.MODE_ECB)` and friends
fn pycryptodome_site(
    fragment: &CodeFragment,
    call: Node,
    root: Node,
    source: &[u8],
    all_calls: &[Node],
) -> Option<CipherCallSite> {
    let function = call.child_by_field_name("function")?;
    if function.kind() != "attribute" {
        return None;
    }
    let object = function.child_by_field_name("object")?;
    let method = function.child_by_field_name("attribute")?;
    if node_text(method, source) != "new" {
        return None;
    }

    // `Crypto.Cipher.AES.new` and plain `AES.new` both end with the
    // algorithm segment
    let object_text = node_text(object, source);
    let algorithm = algorithm_from_module(object_text.rsplit('.').next().unwrap_or(object_text))?;

    let args = call.child_by_field_name("arguments")?;
    let (positional, keywords) = split_arguments(args, source);

    let key_node = positional.first().copied();
    let mode_node = positional
        .get(1)
        .copied()
        .or_else(|| keywords.iter().find(|(n, _)| *n == "mode").map(|(_, v)| *v));
    let iv_node = keywords
        .iter()
        .find(|(n, _)| *n == "iv" || *n == "nonce")
        .map(|(_, v)| *v)
        .or_else(|| positional.get(2).copied());

    let (mode, resolution, mode_expr) = match mode_node {
        Some(node) => {
            let (mode, path) = resolve::resolve_mode(node, root, source);
            (mode, path, node_text(node, source).to_string())
        }
        // Factory call without a mode argument is an unexpected signature;
        // surfaced as an unresolved site, classified indeterminate
        None => (None, ResolutionPath::Unresolved, String::new()),
    };

    let key = key_node.map(|node| resolve::resolve_key(node, root, source));

    Some(CipherCallSite {
        fragment: fragment.id.clone(),
        line: fragment.id.line_start + call.start_position().row as u32,
        algorithm,
        mode_expr,
        mode,
        resolution,
        key_expr: key.as_ref().map(|k| k.expr.clone()),
        key_bits: key.as_ref().and_then(|k| k.bits),
        key_is_random_per_call: key.as_ref().map(|k| k.random_per_call).unwrap_or(false),
        iv_expr: iv_node.map(|node| node_text(node, source).to_string()),
        enclosing_function: enclosing_function(call, source),
        encrypt_calls: count_encrypt_calls(call, source, all_calls),
    })
}

/// `Cipher(algorithms.AES(key), modes.ECB())`
fn hazmat_site(
    fragment: &CodeFragment,
    call: Node,
    root: Node,
    source: &[u8],
    all_calls: &[Node],
) -> Option<CipherCallSite> {
    let function = call.child_by_field_name("function")?;
    let function_name = match function.kind() {
        "identifier" => node_text(function, source),
        "attribute" => node_text(function.child_by_field_name("attribute")?, source),
        _ => return None,
    };
    if function_name != "Cipher" {
        return None;
    }

    let args = call.child_by_field_name("arguments")?;
    let (positional, keywords) = split_arguments(args, source);

    let algorithm_call = positional
        .first()
        .copied()
        .or_else(|| keywords.iter().find(|(n, _)| *n == "algorithm").map(|(_, v)| *v))?;
    let mode_call = positional
        .get(1)
        .copied()
        .or_else(|| keywords.iter().find(|(n, _)| *n == "mode").map(|(_, v)| *v));

    // First argument must look like algorithms.<Alg>(key)
    let (algorithm, key_node) = hazmat_algorithm(algorithm_call, source)?;

    let (mode, resolution, mode_expr) = match mode_call {
        Some(node) => {
            let (mode, path) = resolve::resolve_hazmat_mode(node, source);
            (mode, path, node_text(node, source).to_string())
        }
        None => (None, ResolutionPath::Unresolved, String::new()),
    };

    let key = key_node.map(|node| resolve::resolve_key(node, root, source));

    Some(CipherCallSite {
        fragment: fragment.id.clone(),
        line: fragment.id.line_start + call.start_position().row as u32,
        algorithm,
        mode_expr,
        mode,
        resolution,
        key_expr: key.as_ref().map(|k| k.expr.clone()),
        key_bits: key.as_ref().and_then(|k| k.bits),
        key_is_random_per_call: key.as_ref().map(|k| k.random_per_call).unwrap_or(false),
        iv_expr: None,
        enclosing_function: enclosing_function(call, source),
        encrypt_calls: count_encrypt_calls(call, source, all_calls),
    })
}

/// Pull the algorithm name and key argument out of `algorithms.AES(key)`
fn hazmat_algorithm<'a>(
    node: Node<'a>,
    source: &'a [u8],
) -> Option<(CipherAlgorithm, Option<Node<'a>>)> {
    if node.kind() != "call" {
        return None;
    }
    let function = node.child_by_field_name("function")?;
    let name = match function.kind() {
        "attribute" => node_text(function.child_by_field_name("attribute")?, source),
        "identifier" => node_text(function, source),
        _ => return None,
    };
    let algorithm = match name {
        "AES" | "AES128" | "AES256" => CipherAlgorithm::Aes,
        "TripleDES" => CipherAlgorithm::TripleDes,
        "Blowfish" => CipherAlgorithm::Blowfish,
        "ARC4" => CipherAlgorithm::Rc4,
        other => CipherAlgorithm::Other(other.to_string()),
    };
    let key = node
        .child_by_field_name("arguments")
        .and_then(|args| split_arguments(args, source).0.first().copied());
    Some((algorithm, key))
}

fn algorithm_from_module(name: &str) -> Option<CipherAlgorithm> {
    match name {
        "AES" => Some(CipherAlgorithm::Aes),
        "DES" => Some(CipherAlgorithm::Des),
        "DES3" => Some(CipherAlgorithm::TripleDes),
        "ARC2" => Some(CipherAlgorithm::Rc2),
        "ARC4" => Some(CipherAlgorithm::Rc4),
        "Blowfish" => Some(CipherAlgorithm::Blowfish),
        "ChaCha20" | "Salsa20" | "CAST" => Some(CipherAlgorithm::Other(name.to_string())),
        _ => None,
    }
}

/// Split an argument_list into positional nodes and (name, value) keywords
fn split_arguments<'a>(
    args: Node<'a>,
    source: &'a [u8],
) -> (Vec<Node<'a>>, Vec<(&'a str, Node<'a>)>) {
    let mut positional = Vec::new();
    let mut keywords = Vec::new();

    let mut cursor = args.walk();
    for child in args.named_children(&mut cursor) {
        if child.kind() == "keyword_argument" {
            if let (Some(name), Some(value)) = (
                child.child_by_field_name("name"),
                child.child_by_field_name("value"),
            ) {
                keywords.push((name.utf8_text(source).unwrap_or(""), value));
            }
        } else if child.kind() != "comment" {
            positional.push(child);
        }
    }
    (positional, keywords)
}

/// Walk ancestors to the nearest function definition
fn enclosing_function(call: Node, source: &[u8]) -> Option<EnclosingFunction> {
    let mut current = call.parent();
    while let Some(node) = current {
        if node.kind() == "function_definition" {
            let name = node
                .child_by_field_name("name")
                .map(|n| node_text(n, source).to_string())?;
            let parameters = node
                .child_by_field_name("parameters")
                .map(|p| extract_parameters(p, source))
                .unwrap_or_default();
            return Some(EnclosingFunction { name, parameters });
        }
        current = node.parent();
    }
    None
}

/// Extract parameter names from a parameters node
fn extract_parameters(params: Node, source: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = params.walk();

    for child in params.children(&mut cursor) {
        match child.kind() {
            "identifier" => {
                out.push(node_text(child, source).to_string());
            }
            "typed_parameter" | "default_parameter" | "typed_default_parameter" => {
                if let Some(name) = child.child_by_field_name("name") {
                    out.push(node_text(name, source).to_string());
                } else {
                    // Fallback: first identifier child
                    for grandchild in child.children(&mut child.walk()) {
                        if grandchild.kind() == "identifier" {
                            out.push(node_text(grandchild, source).to_string());
                            break;
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Count `.encrypt(...)` calls on the object this construction was bound to.
///
/// Covers `c = AES.new(...)` followed by `c.encrypt(...)` and the chained
/// `AES.new(...).encrypt(...)` spelling.
fn count_encrypt_calls(construction: Node, source: &[u8], all_calls: &[Node]) -> u32 {
    // Chained: the construction is itself the object of an encrypt call
    if let Some(parent) = construction.parent() {
        if parent.kind() == "attribute" {
            if let Some(attr) = parent.child_by_field_name("attribute") {
                if node_text(attr, source) == "encrypt" {
                    return 1;
                }
            }
        }
    }

    // Bound: find the assignment target, then count encrypt calls on it
    let Some(var) = assignment_target(construction, source) else {
        return 0;
    };

    let mut count = 0;
    for call in all_calls {
        let Some(function) = call.child_by_field_name("function") else {
            continue;
        };
        if function.kind() != "attribute" {
            continue;
        }
        let Some(object) = function.child_by_field_name("object") else {
            continue;
        };
        let Some(attr) = function.child_by_field_name("attribute") else {
            continue;
        };
        if node_text(attr, source) == "encrypt" && node_text(object, source) == var {
            count += 1;
        }
    }
    count
}

/// Name the construction result was assigned to, if any
fn assignment_target<'a>(construction: Node, source: &'a [u8]) -> Option<&'a str> {
    let parent = construction.parent()?;
    if parent.kind() != "assignment" {
        return None;
    }
    let left = parent.child_by_field_name("left")?;
    if left.kind() != "identifier" {
        return None;
    }
    Some(node_text(left, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CipherMode, CodeFragment};

    fn extract(source: &str) -> Vec<CipherCallSite> {
        let fragment = CodeFragment::new("test/project", "crypto.py", 1, 50, source);
        let tree = parse_fragment(source).expect("parse");
        extract_call_sites(&fragment, &tree)
    }

    #[test]
    fn test_pycryptodome_literal_ecb() {
        let sites = extract(
            "from Crypto.Cipher import AES\n\
             cipher = AES.new(b'0123456789abcdef', AES.MODE_ECB)\n\
             ct = cipher.encrypt(data)\n",
        );
        assert_eq!(sites.len(), 1);
        let site = &sites[0];
        assert_eq!(site.algorithm, CipherAlgorithm::Aes);
        assert_eq!(site.mode, Some(CipherMode::Ecb));
        assert_eq!(site.resolution, ResolutionPath::Literal);
        assert_eq!(site.key_bits, Some(128));
        assert_eq!(site.encrypt_calls, 1);
        assert_eq!(site.line, 2);
    }

    #[test]
    fn test_fully_qualified_factory() {
        let sites = extract("c = Crypto.Cipher.AES.new(key, Crypto.Cipher.AES.MODE_ECB)\n");
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].mode, Some(CipherMode::Ecb));
    }

    #[test]
    fn test_mode_keyword_argument() {
        let sites = extract("c = AES.new(key, mode=AES.MODE_GCM, nonce=n)\n");
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].mode, Some(CipherMode::Gcm));
        assert_eq!(sites[0].iv_expr.as_deref(), Some("n"));
    }

    #[test]
    fn test_multiple_constructions_in_one_fragment() {
        let sites = extract(
            "a = AES.new(k1, AES.MODE_ECB)\n\
             b = AES.new(k2, AES.MODE_CBC, iv)\n",
        );
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].mode, Some(CipherMode::Ecb));
        assert_eq!(sites[1].mode, Some(CipherMode::Cbc));
    }

    #[test]
    fn test_hazmat_factory() {
        let sites = extract(
            "from cryptography.hazmat.primitives.ciphers import Cipher, algorithms, modes\n\
             c = Cipher(algorithms.AES(key), modes.ECB())\n",
        );
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].algorithm, CipherAlgorithm::Aes);
        assert_eq!(sites[0].mode, Some(CipherMode::Ecb));
    }

    #[test]
    fn test_enclosing_function_recorded() {
        let sites = extract(
            "def encrypt_blob(data):\n\
             \x20   c = AES.new(SECRET_KEY, AES.MODE_ECB)\n\
             \x20   return c.encrypt(data)\n",
        );
        assert_eq!(sites.len(), 1);
        let enclosing = sites[0].enclosing_function.as_ref().expect("function");
        assert_eq!(enclosing.name, "encrypt_blob");
        assert_eq!(enclosing.parameters, vec!["data".to_string()]);
    }

    #[test]
    fn test_chained_encrypt_counts() {
        let sites = extract("ct = AES.new(key, AES.MODE_ECB).encrypt(data)\n");
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].encrypt_calls, 1);
    }

    #[test]
    fn test_repeated_encrypt_calls_counted() {
        let sites = extract(
            "c = AES.new(KEY, AES.MODE_ECB)\n\
             a = c.encrypt(m1)\n\
             b = c.encrypt(m2)\n",
        );
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].encrypt_calls, 2);
    }

    #[test]
    fn test_missing_mode_argument() {
        let sites = extract("c = AES.new(key)\n");
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].mode, None);
        assert_eq!(sites[0].resolution, ResolutionPath::Unresolved);
    }

    #[test]
    fn test_unrelated_calls_ignored() {
        let sites = extract("print('hello')\nos.path.join(a, b)\n");
        assert!(sites.is_empty());
    }
}
