//! Algorithms assembled at runtime rather than checked by the compiler.
//!
//! A `BoxedAlg` carries the class surface its author declared, the way a
//! binding for a dynamically typed plugin would. That surface is what
//! [`crate::validate`] checks, so a plugin which declares a wrong signature is
//! rejected before it sees any traffic.

use crate::interface::{ClassSpec, ALG_BASE};
use crate::{GenericCongAvoidAlg, GenericCongAvoidFlow};

pub type BoxedFlow = Box<dyn GenericCongAvoidFlow + Send>;

type FlowFactory = Box<dyn Fn(u32, u32) -> BoxedFlow + Send + Sync>;

pub struct BoxedAlg {
    class: ClassSpec,
    flow_class: Option<ClassSpec>,
    new_flow: FlowFactory,
}

impl BoxedAlg {
    /// `class` is the declared surface; `new_flow` builds each flow.
    pub fn new<G>(class: ClassSpec, new_flow: G) -> Self
    where
        G: Fn(u32, u32) -> BoxedFlow + Send + Sync + 'static,
    {
        BoxedAlg {
            class,
            flow_class: None,
            new_flow: Box::new(new_flow),
        }
    }

    /// Declare the surface of the flows this algorithm creates.
    pub fn with_flow_class(self, flow_class: ClassSpec) -> Self {
        BoxedAlg {
            flow_class: Some(flow_class),
            ..self
        }
    }

    /// Erase the flow type of a statically typed algorithm.
    pub fn from_alg<A>(alg: A) -> Self
    where
        A: GenericCongAvoidAlg + Send + Sync + 'static,
        A::Flow: Send + 'static,
    {
        let class = alg.class_spec();
        let flow_class = alg.flow_class_spec();
        BoxedAlg {
            class,
            flow_class,
            new_flow: Box::new(move |init_cwnd, mss| -> BoxedFlow {
                Box::new(alg.new_flow(init_cwnd, mss))
            }),
        }
    }
}

impl std::fmt::Debug for BoxedAlg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("BoxedAlg")
            .field("class", &self.class)
            .field("flow_class", &self.flow_class)
            .finish()
    }
}

impl GenericCongAvoidAlg for BoxedAlg {
    type Flow = BoxedFlow;

    fn name(&self) -> &str {
        self.class.name()
    }

    fn new_flow(&self, init_cwnd: u32, mss: u32) -> Self::Flow {
        (self.new_flow)(init_cwnd, mss)
    }

    fn class_spec(&self) -> ClassSpec {
        self.class.clone()
    }

    fn flow_class_spec(&self) -> Option<ClassSpec> {
        self.flow_class.clone()
    }
}

/// Shorthand for a boxed algorithm which declares exactly the algorithm interface.
pub fn conforming<G>(name: &str, new_flow: G) -> BoxedAlg
where
    G: Fn(u32, u32) -> BoxedFlow + Send + Sync + 'static,
{
    BoxedAlg::new(ClassSpec::conforming(name, &ALG_BASE), new_flow)
}
