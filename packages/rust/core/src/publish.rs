//! Publish step: convert the generated report and hand it to a [`Publisher`].

use chrono::NaiveDate;
use tracing::{info, instrument};

use oncall_report_markdown::prepare_publication;
use oncall_report_shared::{PublishPage, PublishTarget, Publisher, ReportError, Result};

/// Convert `markdown` and publish it under `target`.
///
/// `today` is used for the fallback title when the document has no
/// front-matter title. Conversion and transport failures are both returned
/// as errors; the caller still owns the original document.
#[instrument(skip_all, fields(space = %target.space_key))]
pub async fn publish_report(
    markdown: &str,
    target: &PublishTarget,
    publisher: &dyn Publisher,
    today: NaiveDate,
) -> Result<PublishPage> {
    let publication = prepare_publication(markdown, today)
        .map_err(|e| ReportError::Publish(format!("could not convert report: {e}")))?;

    let page = PublishPage {
        title: publication.title,
        space_key: target.space_key.clone(),
        parent_id: target.parent_id.clone(),
        body: publication.body,
    };
    publisher.publish(&page).await?;

    info!(title = %page.title, "report published");
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<PublishPage>>,
        reject: bool,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, page: &PublishPage) -> Result<()> {
            if self.reject {
                return Err(ReportError::Publish("status 400".into()));
            }
            self.published.lock().unwrap().push(page.clone());
            Ok(())
        }
    }

    fn target() -> PublishTarget {
        PublishTarget {
            space_key: "OPS".into(),
            parent_id: Some("42".into()),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    }

    #[tokio::test]
    async fn publishes_with_front_matter_title() {
        let publisher = RecordingPublisher::default();
        let md = "---\ntitle: Platform On-Call Report 2024-01-31\n---\n### Other Pages\n\n";

        let page = publish_report(md, &target(), &publisher, today())
            .await
            .expect("published");

        assert_eq!(page.title, "Platform On-Call Report 2024-01-31");
        assert_eq!(page.parent_id.as_deref(), Some("42"));
        assert!(!page.body.contains("title:"));
        assert!(page.body.contains("<h3 id=\"other-pages\">Other Pages</h3>"));
        assert_eq!(publisher.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_dated_title() {
        let publisher = RecordingPublisher::default();
        let page = publish_report("# no front matter\n", &target(), &publisher, today())
            .await
            .expect("published");
        assert_eq!(page.title, "On-Call Report 2024-02-01");
    }

    #[tokio::test]
    async fn publisher_errors_propagate() {
        let publisher = RecordingPublisher {
            reject: true,
            ..Default::default()
        };
        let err = publish_report("body", &target(), &publisher, today())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Publish(_)));
    }
}
