use super::*;

fn create_test_index() -> VectorIndex {
    let mut index = VectorIndex::new();
    index.insert(0, vec![1.0, 0.0, 0.0]).expect("should insert");
    index.insert(1, vec![0.0, 1.0, 0.0]).expect("should insert");
    index.insert(2, vec![0.7, 0.7, 0.0]).expect("should insert");
    index.insert(3, vec![-1.0, 0.0, 0.0]).expect("should insert");
    index
}

#[test]
fn dimension_fixed_by_first_insert() {
    let mut index = VectorIndex::new();
    assert_eq!(index.dimension(), None);

    index.insert(0, vec![0.1, 0.2]).expect("should insert");
    assert_eq!(index.dimension(), Some(2));
}

#[test]
fn wrong_dimension_leaves_index_unchanged() {
    let mut index = create_test_index();
    let before = index.clone();

    let result = index.insert(9, vec![1.0, 2.0]);

    assert!(matches!(
        result,
        Err(StoreError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert_eq!(index, before);
    assert_eq!(index.len(), 4);
}

#[test]
fn configured_dimension_is_enforced_on_first_insert() {
    let mut index = VectorIndex::with_dimension(4).expect("should create index");

    assert!(matches!(
        index.insert(0, vec![1.0, 0.0, 0.0]),
        Err(StoreError::DimensionMismatch {
            expected: 4,
            actual: 3
        })
    ));
    assert!(index.is_empty());

    assert!(VectorIndex::with_dimension(0).is_err());
}

#[test]
fn duplicate_and_non_finite_vectors_are_rejected() {
    let mut index = create_test_index();

    assert!(matches!(
        index.insert(1, vec![0.0, 0.0, 1.0]),
        Err(StoreError::DuplicateId(1))
    ));
    assert!(matches!(
        index.insert(8, vec![f32::NAN, 0.0, 1.0]),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        index.insert(8, Vec::new()),
        Err(StoreError::InvalidArgument(_))
    ));
    assert_eq!(index.len(), 4);
}

#[test]
fn search_ranks_by_cosine_similarity() {
    let index = create_test_index();

    let results = index.search(&[1.0, 0.1, 0.0], 4).expect("should search");
    let ids: Vec<DocumentId> = results.iter().map(|r| r.document_id).collect();

    assert_eq!(ids, vec![0, 2, 1, 3]);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    assert!((results[3].score + 0.995).abs() < 0.01);
}

#[test]
fn search_is_scale_invariant() {
    let index = create_test_index();

    let unit = index.search(&[0.0, 1.0, 0.0], 1).expect("should search");
    let scaled = index.search(&[0.0, 50.0, 0.0], 1).expect("should search");

    assert_eq!(unit[0].document_id, 1);
    assert_eq!(scaled[0].document_id, 1);
    assert!((unit[0].score - 1.0).abs() < 1e-6);
    assert!((scaled[0].score - unit[0].score).abs() < 1e-6);
}

#[test]
fn ties_keep_insertion_order() {
    let mut index = VectorIndex::new();
    index.insert(10, vec![0.0, 1.0]).expect("should insert");
    index.insert(4, vec![1.0, 0.0]).expect("should insert");
    index.insert(7, vec![2.0, 0.0]).expect("should insert");
    index.insert(1, vec![3.0, 0.0]).expect("should insert");

    let results = index.search(&[1.0, 0.0], 3).expect("should search");
    let ids: Vec<DocumentId> = results.iter().map(|r| r.document_id).collect();

    assert_eq!(ids, vec![4, 7, 1]);
}

#[test]
fn search_truncates_to_k() {
    let index = create_test_index();

    assert_eq!(index.search(&[1.0, 0.0, 0.0], 2).expect("should search").len(), 2);
    assert_eq!(
        index
            .search(&[1.0, 0.0, 0.0], 100)
            .expect("should search")
            .len(),
        4
    );
}

#[test]
fn search_errors() {
    let empty = VectorIndex::new();
    assert!(matches!(
        empty.search(&[1.0, 0.0], 3),
        Err(StoreError::EmptyIndex)
    ));

    let configured_empty = VectorIndex::with_dimension(3).expect("should create index");
    assert!(matches!(
        configured_empty.search(&[1.0, 0.0, 0.0], 3),
        Err(StoreError::EmptyIndex)
    ));

    let index = create_test_index();
    assert!(matches!(
        index.search(&[1.0, 0.0, 0.0], 0),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        index.search(&[1.0, 0.0], 1),
        Err(StoreError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
}

#[test]
fn zero_vectors_score_zero() {
    let mut index = VectorIndex::new();
    index.insert(0, vec![0.0, 0.0]).expect("should insert");
    index.insert(1, vec![1.0, 1.0]).expect("should insert");

    let results = index.search(&[0.0, 0.0], 2).expect("should search");
    assert!(results.iter().all(|r| r.score == 0.0));
    assert_eq!(results[0].document_id, 0);

    let results = index.search(&[1.0, 1.0], 2).expect("should search");
    assert_eq!(results[0].document_id, 1);
    assert_eq!(results[1].score, 0.0);
}

#[test]
fn signed_zero_scores_tie_in_insertion_order() {
    let mut index = VectorIndex::new();
    index.insert(1, vec![-0.0, 1.0]).expect("should insert");
    index.insert(2, vec![0.0, 0.0]).expect("should insert");

    let results = index.search(&[1.0, -0.0], 2).expect("should search");
    assert_eq!(results[0].score, results[1].score);
    assert!(results[0].score.is_sign_positive());

    let ids: Vec<DocumentId> = results.iter().map(|r| r.document_id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn large_components_do_not_overflow() {
    let mut index = VectorIndex::new();
    index.insert(1, vec![1.0, 1.0]).expect("should insert");
    index.insert(2, vec![1e20, 1e20]).expect("should insert");
    index.insert(3, vec![1.0, -1.0]).expect("should insert");

    let results = index.search(&[1e20, 1e20], 3).expect("should search");
    assert!(results.iter().all(|r| r.score.is_finite()));

    // Ids 1 and 2 point the same way, so both score 1 and keep insertion order
    let ids: Vec<DocumentId> = results.iter().map(|r| r.document_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert!((results[1].score - 1.0).abs() < 1e-6);
    assert!(results[2].score.abs() < 1e-6);
}

#[test]
fn non_finite_query_is_rejected() {
    let index = create_test_index();

    assert!(matches!(
        index.search(&[f32::NAN, 0.0, 0.0], 1),
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        index.search(&[f32::INFINITY, 0.0, 0.0], 1),
        Err(StoreError::InvalidArgument(_))
    ));
}
