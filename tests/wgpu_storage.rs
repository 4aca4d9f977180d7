#![cfg(feature = "wgpu")]

use std::sync::Arc;

use parvec::prelude::*;

fn gpu() -> Option<(Arc<wgpu::Device>, Arc<wgpu::Queue>)> {
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(
        instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
    )?;
    let (device, queue) = pollster::block_on(
        adapter.request_device(&wgpu::DeviceDescriptor::default(), None),
    )
    .ok()?;
    Some((Arc::new(device), Arc::new(queue)))
}

#[test]
fn cross_space_round_trip_is_bit_exact() {
    let Some((device, queue)) = gpu() else {
        eprintln!("no wgpu adapter available; skipping");
        return;
    };
    let host = HostStorage::from(vec![1.0f64, -2.5, 1.0e-300, 4.0]);
    let mut dev = DeviceStorage::<f64>::new(device, queue, 4).unwrap();
    transfer(&host, &mut dev).unwrap();
    let mut back = HostStorage::<f64>::allocate(4).unwrap();
    transfer(&dev, &mut back).unwrap();
    assert_eq!(host.as_slice(), back.as_slice());
}

#[test]
fn device_vector_imports_from_host() {
    let Some((device, queue)) = gpu() else {
        eprintln!("no wgpu adapter available; skipping");
        return;
    };
    let p = Arc::new(Partition::serial(4));
    let mut host_v = Vector::<f64>::new(p.clone()).unwrap();
    for g in 0..4 {
        host_v.set(g, g as f64 + 0.25).unwrap();
    }

    let storage = DeviceStorage::<f64>::new(device, queue, 4).unwrap();
    let mut dev_v = Vector::from_storage(p.clone(), storage).unwrap();
    dev_v.import_elements(&host_v).unwrap();
    assert_eq!(dev_v.get(2).unwrap(), 2.25);

    let mut back = Vector::<f64>::new(p).unwrap();
    back.import_elements(&dev_v).unwrap();
    assert_eq!(back.as_slice(), host_v.as_slice());
}
