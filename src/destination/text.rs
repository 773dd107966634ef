use super::store::AttachmentMap;
use crate::model::snapshot::AttachmentRef;

/// Replace references to source attachment downloads with the uploaded
/// destination URLs. Returns the rewritten text and the filenames that had
/// no uploaded counterpart; their references are left as they were.
pub fn rewrite_attachment_urls(
    html: &str,
    attachments: &[AttachmentRef],
    uploaded: &AttachmentMap,
) -> (String, Vec<String>) {
    let mut text = html.to_string();
    let mut missing = Vec::new();

    for attachment in attachments {
        let Some(target) = uploaded.get(&attachment.filename) else {
            missing.push(attachment.filename.clone());
            continue;
        };
        let raw = format!("/attachments/download/{}/{}", attachment.id, attachment.filename);
        let encoded = format!(
            "/attachments/download/{}/{}",
            attachment.id,
            urlencoding::encode(&attachment.filename)
        );
        // Absolute form first so the host is not left dangling in front of
        // the new URL.
        if !attachment.url.is_empty() {
            text = text.replace(&attachment.url, &target.url);
        }
        text = text.replace(&raw, &target.url);
        if encoded != raw {
            text = text.replace(&encoded, &target.url);
        }
    }

    (text, missing)
}

/// Line prepended to a migrated comment; the destination records the
/// migrating account as author, so the source author is carried in the text.
pub fn note_header(author: &str, created_on: &str) -> String {
    format!("<p>Added by {author} on {created_on}</p>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::UploadedAttachment;

    fn attachment(id: &str, filename: &str) -> AttachmentRef {
        AttachmentRef {
            id: id.into(),
            filename: filename.into(),
            url: format!("https://rm.test/attachments/download/{id}/{filename}"),
        }
    }

    fn uploaded(filename: &str, url: &str) -> AttachmentMap {
        let mut map = AttachmentMap::default();
        map.insert(
            filename,
            UploadedAttachment {
                id: "x".into(),
                url: url.into(),
            },
        );
        map
    }

    #[test]
    fn relative_download_path_is_replaced() {
        let html = r#"<a href="/attachments/download/31/trace.log">trace</a>"#;
        let (text, missing) = rewrite_attachment_urls(
            html,
            &[attachment("31", "trace.log")],
            &uploaded("trace.log", "https://az/att/1"),
        );
        assert_eq!(text, r#"<a href="https://az/att/1">trace</a>"#);
        assert!(missing.is_empty());
        assert!(!text.contains("/attachments/download/31/trace.log"));
    }

    #[test]
    fn absolute_and_encoded_forms_are_replaced() {
        let html = concat!(
            r#"<img src="https://rm.test/attachments/download/4/my%20shot.png">"#,
            r#"<a href="/attachments/download/4/my shot.png">x</a>"#
        );
        let mut att = attachment("4", "my shot.png");
        att.url = "https://rm.test/attachments/download/4/my%20shot.png".into();
        let (text, _) = rewrite_attachment_urls(html, &[att], &uploaded("my shot.png", "https://az/att/4"));
        assert_eq!(text.matches("https://az/att/4").count(), 2);
        assert!(!text.contains("rm.test"));
        assert!(!text.contains("/attachments/download/"));
    }

    #[test]
    fn unknown_attachment_is_reported_and_left_alone() {
        let html = r#"<a href="/attachments/download/9/gone.zip">x</a>"#;
        let (text, missing) =
            rewrite_attachment_urls(html, &[attachment("9", "gone.zip")], &AttachmentMap::default());
        assert_eq!(text, html);
        assert_eq!(missing, vec!["gone.zip"]);
    }

    #[test]
    fn header_names_author_and_date() {
        assert_eq!(
            note_header("Ann", "2021-04-02T00:00:00Z"),
            "<p>Added by Ann on 2021-04-02T00:00:00Z</p>"
        );
    }
}
