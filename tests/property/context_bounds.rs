//! Context windows never include their own unit and never read out of range.

use folio::context::{build_context, WindowBounds, CONTEXT_HEADER};
use proptest::prelude::*;

fn tagged(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("<u{}>", i)).collect()
}

#[test]
fn test_context_excludes_target_unit() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(1usize..40, 0usize..50, 0usize..10, 0usize..10),
            |(len, index, before, after)| {
                let seq = tagged(len);
                let ctx = build_context(&seq, index, before, after);

                prop_assert!(ctx.starts_with(CONTEXT_HEADER));
                if index < len {
                    let own = format!("<u{}>", index);
                    prop_assert!(!ctx.contains(&own));
                }
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_context_includes_exactly_the_window() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(1usize..40, 0usize..40, 0usize..10, 0usize..10),
            |(len, index, before, after)| {
                prop_assume!(index < len);
                let seq = tagged(len);
                let ctx = build_context(&seq, index, before, after);

                for (i, unit) in seq.iter().enumerate() {
                    let expected = (i < index && index - i <= before)
                        || (i > index && i - index <= after);
                    prop_assert_eq!(ctx.contains(unit.as_str()), expected, "unit {}", i);
                }
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_bounds_stay_in_range() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(0usize..40, any::<usize>(), any::<usize>(), any::<usize>()),
            |(len, index, before, after)| {
                let bounds = WindowBounds::new(len, index, before, after);
                let b = bounds.before(index, len);
                let a = bounds.after(index);

                prop_assert!(b.start <= b.end && b.end <= len);
                prop_assert!(a.start <= a.end && a.end <= len);
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_zero_window_is_header_only() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(0usize..20, 0usize..20), |(len, index)| {
            let seq = tagged(len);
            let ctx = build_context(&seq, index, 0, 0);
            prop_assert_eq!(
                ctx,
                format!("{}\nChapters Before:\n\nChapters After:\n", CONTEXT_HEADER)
            );
            Ok(())
        })
        .unwrap();
}
