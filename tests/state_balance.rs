use std::path::PathBuf;

use capypdf::configure::DocumentProperties;
use capypdf::{CapyError, Document};
use proptest::prelude::*;

fn document() -> Document {
    Document::new(PathBuf::from("unused.pdf"), DocumentProperties::default()).unwrap()
}

proptest! {
    // `true` saves, `false` restores.
    #[test]
    fn pages_register_only_when_balanced(ops in proptest::collection::vec(any::<bool>(), 0..40)) {
        let mut document = document();
        let mut page = document.new_page_context();
        let mut depth = 0u32;

        for save in ops {
            if save {
                page.save_state();
                depth += 1;
            } else if depth == 0 {
                prop_assert!(matches!(page.restore_state(), Err(CapyError::UnbalancedState(_))));
            } else {
                prop_assert!(page.restore_state().is_ok());
                depth -= 1;
            }

            prop_assert_eq!(page.state_depth(), depth);
        }

        let result = document.add_page(page);
        if depth == 0 {
            prop_assert!(result.is_ok());
            prop_assert_eq!(document.page_count(), 1);
        } else {
            prop_assert!(matches!(result, Err(CapyError::UnbalancedState(_))));
            prop_assert_eq!(document.page_count(), 0);
        }
    }

    #[test]
    fn marked_content_must_be_closed(depth in 0usize..8) {
        let mut document = document();
        let mut page = document.new_page_context();

        for _ in 0..depth {
            page.begin_marked_content("Span").unwrap();
        }
        prop_assert_eq!(page.marked_content_depth(), depth);

        let result = document.add_page(page);
        prop_assert_eq!(result.is_ok(), depth == 0);
    }
}

#[test]
fn end_without_begin_is_unbalanced() {
    let document = document();
    let mut page = document.new_page_context();

    assert!(matches!(
        page.end_marked_content(),
        Err(CapyError::UnbalancedState(_))
    ));
}
