//! Canonical YAML encoding of a document list.

use crate::document::Document;

/// Document separator.
const SEPARATOR: &str = "---\n";

/// Which comments the encoder renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommentsFlags {
    /// Prefix each document with its kind's one-line documentation
    pub documentation: bool,
    /// Append the kind's example as a commented block
    pub examples: bool,
}

impl CommentsFlags {
    /// No comments; the canonical form.
    pub const NONE: CommentsFlags = CommentsFlags {
        documentation: false,
        examples: false,
    };

    /// Documentation and examples.
    pub const ALL: CommentsFlags = CommentsFlags {
        documentation: true,
        examples: true,
    };

    fn any(&self) -> bool {
        self.documentation || self.examples
    }
}

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncoderOptions {
    /// Comment rendering
    pub comments: CommentsFlags,
}

impl EncoderOptions {
    /// Canonical, comment-free output.
    pub fn canonical() -> Self {
        Self::default()
    }

    /// Output with inline documentation.
    pub fn with_comments(comments: CommentsFlags) -> Self {
        Self { comments }
    }
}

/// Renders `documents` as a multi-document YAML stream.
pub fn encode(
    documents: &[Box<dyn Document>],
    options: &EncoderOptions,
) -> Result<Vec<u8>, serde_yaml::Error> {
    let mut out = String::new();
    for (i, doc) in documents.iter().enumerate() {
        if i > 0 {
            out.push_str(SEPARATOR);
        }
        if options.comments.documentation {
            out.push_str(&format!("# {}\n", doc.description()));
        }
        out.push_str(&serde_yaml::to_string(&doc.to_value()?)?);
        if options.comments.examples {
            if let Some(example) = doc.example_value() {
                out.push_str("# Example:\n");
                for line in serde_yaml::to_string(&example)?.lines() {
                    out.push_str(&format!("#   {}\n", line));
                }
            }
        }
    }
    if options.comments.any() && documents.is_empty() {
        out.push_str("# empty configuration\n");
    }
    Ok(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocumentSpec;
    use crate::types::network::LinkConfig;
    use crate::types::siderolink::SideroLinkConfig;

    fn docs() -> Vec<Box<dyn Document>> {
        vec![
            Box::new(LinkConfig::example()),
            Box::new(SideroLinkConfig::example()),
        ]
    }

    #[test]
    fn test_canonical_has_no_comments() {
        let out = String::from_utf8(encode(&docs(), &EncoderOptions::canonical()).unwrap()).unwrap();
        assert!(!out.contains('#'));
        assert_eq!(out.matches("---\n").count(), 1);
        assert!(out.starts_with("apiVersion: v1alpha1\nkind: LinkConfig\n"));
    }

    #[test]
    fn test_documentation_comments() {
        let options = EncoderOptions::with_comments(CommentsFlags {
            documentation: true,
            examples: false,
        });
        let out = String::from_utf8(encode(&docs(), &options).unwrap()).unwrap();
        assert!(out.starts_with(&format!("# {}\n", LinkConfig::DESCRIPTION)));
        assert!(out.contains(&format!("# {}\n", SideroLinkConfig::DESCRIPTION)));
    }

    #[test]
    fn test_example_comments() {
        let out = String::from_utf8(
            encode(&docs(), &EncoderOptions::with_comments(CommentsFlags::ALL)).unwrap(),
        )
        .unwrap();
        assert_eq!(out.matches("# Example:\n").count(), 2);
        assert!(out.contains("#   kind: SideroLinkConfig\n"));
    }
}
