use fused_lstm::BufferPool;

#[test]
fn test_acquire_returns_requested_shape() {
    let mut pool = BufferPool::new();
    let owner = pool.register_owner();

    let buffer = pool.acquire(owner, "gates", 3, 16);
    assert_eq!(buffer.dim(), (3, 16));
}

#[test]
fn test_release_then_acquire_reuses_storage() {
    let mut pool = BufferPool::new();
    let owner = pool.register_owner();

    let buffer = pool.acquire(owner, "gates", 4, 8);
    let ptr = buffer.as_ptr();
    pool.release(owner, "gates", buffer);

    // Same key, same shape: the backing allocation must come back.
    let reused = pool.acquire(owner, "gates", 4, 8);
    assert_eq!(reused.as_ptr(), ptr);
    assert_eq!(reused.dim(), (4, 8));
}

#[test]
fn test_shrinking_request_keeps_capacity() {
    let mut pool = BufferPool::new();
    let owner = pool.register_owner();

    let big = pool.acquire(owner, "gates", 8, 8);
    let ptr = big.as_ptr();
    pool.release(owner, "gates", big);

    // A smaller checkout must not reallocate.
    let small = pool.acquire(owner, "gates", 2, 8);
    assert_eq!(small.as_ptr(), ptr);
    assert_eq!(small.dim(), (2, 8));
    pool.release(owner, "gates", small);

    // Growing back within the retained capacity also reuses the allocation.
    let grown = pool.acquire(owner, "gates", 8, 8);
    assert_eq!(grown.as_ptr(), ptr);
}

#[test]
fn test_distinct_purposes_are_distinct_buffers() {
    let mut pool = BufferPool::new();
    let owner = pool.register_owner();

    let gates = pool.acquire(owner, "gates", 2, 8);
    let grads = pool.acquire(owner, "grad_gates", 2, 8);
    assert_ne!(gates.as_ptr(), grads.as_ptr());

    pool.release(owner, "gates", gates);
    pool.release(owner, "grad_gates", grads);
    assert_eq!(pool.slot_count(), 2);
}

#[test]
fn test_distinct_owners_do_not_alias() {
    let mut pool = BufferPool::new();
    let first = pool.register_owner();
    let second = pool.register_owner();
    assert_ne!(first, second);

    let a = pool.acquire(first, "gates", 2, 4);
    let ptr_a = a.as_ptr();
    pool.release(first, "gates", a);

    // Another owner's checkout under the same purpose tag must not steal the
    // first owner's storage.
    let b = pool.acquire(second, "gates", 2, 4);
    assert_ne!(b.as_ptr(), ptr_a);
}

#[test]
fn test_first_acquire_is_zero_filled() {
    let mut pool = BufferPool::new();
    let owner = pool.register_owner();

    let buffer = pool.acquire(owner, "gates", 2, 3);
    assert!(buffer.iter().all(|&v| v == 0.0));
}
