/*!
# NetAutoTest Simulator

Local stand-in for an emulated network, used for dry runs and tests.

## Key Components:
- **Network Models:** fixed latency, random jitter and packet loss.
- **Impaired Reflector:** probe responder whose echoes pass through the models.
- **Loopback Provisioner:** a [`Provisioner`](netautotest_core::provision::Provisioner)
  that maps each topology host to a `127.0.0.0/8` address.
*/

pub mod loopback;
pub mod network_simulation;
pub mod reflector;

pub use loopback::LoopbackProvisioner;
pub use network_simulation::LinkImpairment;
pub use reflector::ImpairedReflector;
