use nusdec_storage::Resource;
use nusdec_storage::backend::MockSource;
use nusdec_title::fixtures::FixtureTitle;
use std::sync::Arc;

/// A mock source serving every resource of `title`.
pub(crate) fn source_for(title: &FixtureTitle) -> Arc<MockSource> {
    let mut resources = vec![(Resource::Manifest, title.manifest.clone()), (Resource::Ticket, title.ticket.clone())];
    for content in &title.contents {
        resources.push((Resource::Content(content.record.id), content.ciphertext.clone()));
        if let Some(tree) = &content.hash_tree {
            resources.push((Resource::HashTree(content.record.id), tree.clone()));
        }
    }
    Arc::new(MockSource::with_resources(resources))
}
